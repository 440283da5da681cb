use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::storage::layout::{segments, validate_segment, STAGING_SEGMENT};
use crate::storage::persister::{ListKind, Persister, RenameOutcome};

/// Filesystem persister: one file per value, one directory per namespace.
///
/// Key `shop/users/42` lives at `<directory>/shop/users/42`. Values are
/// written to `<directory>/.staging` first and renamed into place, so a
/// reader sees either the old or the new bytes.
#[derive(Debug, Clone)]
pub struct LocalPersister {
    directory: PathBuf,
}

impl LocalPersister {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        LocalPersister { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(root: &Path, key: &str) -> Result<PathBuf> {
        let mut path = root.to_path_buf();
        for (depth, segment) in segments(key).enumerate() {
            validate_segment("key segment", segment)?;
            if depth == 0 && segment == STAGING_SEGMENT {
                return Err(Error::invalid_argument(format!(
                    "key '{}' points into the staging area",
                    key
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn staging_dir(root: &Path) -> PathBuf {
        root.join(STAGING_SEGMENT)
    }
}

#[async_trait]
impl Persister for LocalPersister {
    /// Verified root directory
    type State = PathBuf;

    fn name(&self) -> &'static str {
        "local"
    }

    async fn setup(&self) -> Result<PathBuf> {
        match fs::metadata(&self.directory).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::invalid_argument(format!(
                    "expected {} to be a directory",
                    self.directory.display()
                )));
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                fs::create_dir_all(&self.directory).await?;
                info!(directory = %self.directory.display(), "created data directory");
            }
            Err(e) => return Err(e.into()),
        }

        fs::create_dir_all(Self::staging_dir(&self.directory)).await?;
        Ok(self.directory.clone())
    }

    async fn get(&self, root: &PathBuf, key: &str) -> Result<Option<Bytes>> {
        let path = Self::path_for(root, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, root: &PathBuf, key: &str, bytes: Bytes) -> Result<()> {
        let path = Self::path_for(root, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staged = Self::staging_dir(root).join(Uuid::new_v4().to_string());
        fs::write(&staged, &bytes).await?;
        if let Err(e) = fs::rename(&staged, &path).await {
            if let Err(cleanup) = fs::remove_file(&staged).await {
                warn!(file = %staged.display(), error = %cleanup, "could not drop staged write");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, root: &PathBuf, key: &str) -> Result<()> {
        let path = Self::path_for(root, key)?;
        match fs::remove_file(&path).await {
            Err(e) if e.kind() != IoErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list(&self, root: &PathBuf, prefix: &str, kind: ListKind) -> Result<Option<Vec<String>>> {
        let path = Self::path_for(root, prefix)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let wanted = match kind {
                ListKind::Namespaces => file_type.is_dir(),
                ListKind::Values => file_type.is_file(),
            };
            if !wanted || (path == *root && entry.file_name().as_os_str() == STAGING_SEGMENT) {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(entry = ?raw, "skipping non UTF-8 entry"),
            }
        }

        Ok(Some(names))
    }

    async fn create_namespace(&self, root: &PathBuf, prefix: &str) -> Result<()> {
        let path = Self::path_for(root, prefix)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn rename_namespace(&self, root: &PathBuf, from: &str, to: &str) -> Result<RenameOutcome> {
        let source = Self::path_for(root, from)?;
        let target = Self::path_for(root, to)?;

        match fs::metadata(&source).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(RenameOutcome::SourceMissing),
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(RenameOutcome::SourceMissing),
            Err(e) => return Err(e.into()),
        }

        if source == target {
            return Ok(RenameOutcome::Renamed);
        }

        // An empty target directory is replaced, anything else blocks the move
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {
                let mut entries = fs::read_dir(&target).await?;
                if entries.next_entry().await?.is_some() {
                    return Ok(RenameOutcome::Conflict);
                }
                fs::remove_dir(&target).await?;
            }
            Ok(_) => return Ok(RenameOutcome::Conflict),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await?;
        debug!(from = %source.display(), to = %target.display(), "moved namespace");

        Ok(RenameOutcome::Renamed)
    }

    async fn remove_namespace(&self, root: &PathBuf, prefix: &str) -> Result<()> {
        let path = Self::path_for(root, prefix)?;
        if path == *root {
            return Err(Error::invalid_argument("refusing to remove the data root"));
        }

        match fs::remove_dir_all(&path).await {
            Err(e) if e.kind() != IoErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn namespace_size(&self, root: &PathBuf, prefix: &str) -> Result<Option<u64>> {
        let path = Self::path_for(root, prefix)?;
        match fs::metadata(&path).await {
            Ok(meta) if !meta.is_dir() => return Ok(Some(meta.len())),
            Ok(_) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut total = 0u64;
        let mut pending = vec![path];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }

        Ok(Some(total))
    }
}
