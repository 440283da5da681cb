use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use crate::core::error::{Error, Result};

/// Result of moving one namespace onto another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    SourceMissing,
    Conflict,   // Target already holds entries
}

/// Which children of a namespace to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Namespaces,  // Nested namespaces (databases, collections)
    Values,      // Stored values (documents)
}

/// Byte store addressed by `/`-separated string keys.
///
/// `setup` runs once per [`PersisterHandle`]; the state it yields is passed
/// to every later call. `get` reports a missing key as `None` and `remove`
/// of a missing key succeeds.
///
/// The namespace methods enumerate and move whole key prefixes. Backends
/// that cannot enumerate keep the default bodies, which fail with
/// `ErrorKind::Unsupported`.
#[async_trait]
pub trait Persister: Send + Sync + 'static {
    type State: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn setup(&self) -> Result<Self::State>;

    async fn get(&self, state: &Self::State, key: &str) -> Result<Option<Bytes>>;

    async fn set(&self, state: &Self::State, key: &str, bytes: Bytes) -> Result<()>;

    async fn remove(&self, state: &Self::State, key: &str) -> Result<()>;

    /// Children directly under `prefix` (`""` is the root), `None` if the
    /// namespace does not exist
    async fn list(
        &self,
        _state: &Self::State,
        _prefix: &str,
        _kind: ListKind,
    ) -> Result<Option<Vec<String>>> {
        Err(Error::unsupported(self.name(), "listing namespaces"))
    }

    async fn create_namespace(&self, _state: &Self::State, _prefix: &str) -> Result<()> {
        Err(Error::unsupported(self.name(), "creating namespaces"))
    }

    async fn rename_namespace(
        &self,
        _state: &Self::State,
        _from: &str,
        _to: &str,
    ) -> Result<RenameOutcome> {
        Err(Error::unsupported(self.name(), "renaming namespaces"))
    }

    async fn remove_namespace(&self, _state: &Self::State, _prefix: &str) -> Result<()> {
        Err(Error::unsupported(self.name(), "removing namespaces"))
    }

    /// Total bytes stored under `prefix`, `None` if the namespace does not exist
    async fn namespace_size(&self, _state: &Self::State, _prefix: &str) -> Result<Option<u64>> {
        Err(Error::unsupported(self.name(), "measuring namespaces"))
    }
}

#[async_trait]
trait ErasedPersister: Send + Sync {
    fn name(&self) -> &'static str;
    async fn ready(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
    async fn set(&self, key: &str, bytes: Bytes) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn list(&self, prefix: &str, kind: ListKind) -> Result<Option<Vec<String>>>;
    async fn create_namespace(&self, prefix: &str) -> Result<()>;
    async fn rename_namespace(&self, from: &str, to: &str) -> Result<RenameOutcome>;
    async fn remove_namespace(&self, prefix: &str) -> Result<()>;
    async fn namespace_size(&self, prefix: &str) -> Result<Option<u64>>;
}

/// A backend plus the outcome of its one setup call
struct Initialized<P: Persister> {
    persister: P,
    state: OnceCell<Result<P::State>>,
}

impl<P: Persister> Initialized<P> {
    /// Every caller awaits the same setup; a failed setup is never retried
    async fn state(&self) -> Result<&P::State> {
        let outcome = self
            .state
            .get_or_init(|| async {
                let name = self.persister.name();
                info!(persister = name, "setting up persister");
                let outcome = self.persister.setup().await;
                if let Err(err) = &outcome {
                    warn!(persister = name, error = %err, "persister setup failed");
                }
                outcome
            })
            .await;

        outcome.as_ref().map_err(Clone::clone)
    }
}

#[async_trait]
impl<P: Persister> ErasedPersister for Initialized<P> {
    fn name(&self) -> &'static str {
        self.persister.name()
    }

    async fn ready(&self) -> Result<()> {
        self.state().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let state = self.state().await?;
        self.persister.get(state, key).await
    }

    async fn set(&self, key: &str, bytes: Bytes) -> Result<()> {
        let state = self.state().await?;
        self.persister.set(state, key, bytes).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let state = self.state().await?;
        self.persister.remove(state, key).await
    }

    async fn list(&self, prefix: &str, kind: ListKind) -> Result<Option<Vec<String>>> {
        let state = self.state().await?;
        self.persister.list(state, prefix, kind).await
    }

    async fn create_namespace(&self, prefix: &str) -> Result<()> {
        let state = self.state().await?;
        self.persister.create_namespace(state, prefix).await
    }

    async fn rename_namespace(&self, from: &str, to: &str) -> Result<RenameOutcome> {
        let state = self.state().await?;
        self.persister.rename_namespace(state, from, to).await
    }

    async fn remove_namespace(&self, prefix: &str) -> Result<()> {
        let state = self.state().await?;
        self.persister.remove_namespace(state, prefix).await
    }

    async fn namespace_size(&self, prefix: &str) -> Result<Option<u64>> {
        let state = self.state().await?;
        self.persister.namespace_size(state, prefix).await
    }
}

/// Shared, cheaply clonable handle to one active persister.
///
/// Setup is lazy: the first operation triggers it and concurrent first
/// operations wait on that same setup.
#[derive(Clone)]
pub struct PersisterHandle {
    inner: Arc<dyn ErasedPersister>,
}

impl PersisterHandle {
    pub fn new<P: Persister>(persister: P) -> Self {
        PersisterHandle {
            inner: Arc::new(Initialized {
                persister,
                state: OnceCell::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Run setup now instead of on first use
    pub async fn ready(&self) -> Result<()> {
        self.inner.ready().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, bytes: impl Into<Bytes> + Send) -> Result<()> {
        self.inner.set(key, bytes.into()).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    pub async fn list(&self, prefix: &str, kind: ListKind) -> Result<Option<Vec<String>>> {
        self.inner.list(prefix, kind).await
    }

    pub async fn create_namespace(&self, prefix: &str) -> Result<()> {
        debug!(persister = self.name(), prefix, "create namespace");
        self.inner.create_namespace(prefix).await
    }

    pub async fn rename_namespace(&self, from: &str, to: &str) -> Result<RenameOutcome> {
        debug!(persister = self.name(), from, to, "rename namespace");
        self.inner.rename_namespace(from, to).await
    }

    pub async fn remove_namespace(&self, prefix: &str) -> Result<()> {
        debug!(persister = self.name(), prefix, "remove namespace");
        self.inner.remove_namespace(prefix).await
    }

    pub async fn namespace_size(&self, prefix: &str) -> Result<Option<u64>> {
        self.inner.namespace_size(prefix).await
    }
}

impl fmt::Debug for PersisterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersisterHandle")
            .field("name", &self.name())
            .finish()
    }
}
