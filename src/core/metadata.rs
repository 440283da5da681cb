use bytes::Bytes;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Meta, RequestCount};
use crate::storage::layout::KeyScheme;
use crate::storage::persister::PersisterHandle;

/// Reads and writes per-database metadata records through the persister.
///
/// Counter updates are read-modify-write without any lock: concurrent
/// updates of one database may lose increments.
#[derive(Debug, Clone)]
pub struct MetaStore {
    persister: PersisterHandle,
}

impl MetaStore {
    pub fn new(persister: PersisterHandle) -> Self {
        MetaStore { persister }
    }

    /// The stored record, without any access check
    pub async fn read(&self, database: &str) -> Result<Option<Meta>> {
        let key = KeyScheme::meta_key(database)?;
        let bytes = match self.persister.get(&key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let meta = serde_json::from_slice(&bytes).map_err(|e| {
            Error::new(
                ErrorKind::Parse,
                format!("metadata of database '{}' is malformed: {}", database, e),
            )
        })?;
        Ok(Some(meta))
    }

    pub async fn write(&self, database: &str, meta: &Meta) -> Result<()> {
        let key = KeyScheme::meta_key(database)?;
        let bytes = serde_json::to_vec(meta)?;
        self.persister.set(&key, Bytes::from(bytes)).await
    }

    /// Add to the counters of an existing record. Returns the new counts,
    /// `None` (and nothing written) if the database has no record.
    pub async fn record_requests(
        &self,
        database: &str,
        reads: u64,
        writes: u64,
    ) -> Result<Option<RequestCount>> {
        let mut meta = match self.read(database).await? {
            Some(meta) => meta,
            None => {
                debug!(database, "no metadata record, request not counted");
                return Ok(None);
            }
        };

        meta.requests = meta.requests.add(reads, writes);
        self.write(database, &meta).await?;
        Ok(Some(meta.requests))
    }

    pub async fn request_count(&self, database: &str) -> Result<Option<RequestCount>> {
        Ok(self.read(database).await?.map(|meta| meta.requests))
    }
}
