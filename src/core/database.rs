use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;
use crate::core::access::authorize;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::metadata::MetaStore;
use crate::core::types::{Meta, RequestCount};
use crate::document::model::Model;
use crate::document::subscription::{SubscriberRegistry, Subscription};
use crate::query::matcher::{document_matches, TestSet};
use crate::storage::layout::KeyScheme;
use crate::storage::local::LocalPersister;
use crate::storage::persister::{ListKind, PersisterHandle, RenameOutcome};

/// Multi-tenant entry point: databases, their collections and documents.
///
/// Document reads that find a document and document writes are counted in
/// the database's metadata record. Cloning is cheap and clones share one
/// subscriber registry.
#[derive(Debug, Clone)]
pub struct Database {
    persister: PersisterHandle,
    meta: MetaStore,
    subscribers: Arc<SubscriberRegistry<Value>>,
    id_field: String,
}

impl Database {
    pub fn new(persister: PersisterHandle) -> Self {
        Database {
            meta: MetaStore::new(persister.clone()),
            persister,
            subscribers: Arc::new(SubscriberRegistry::new()),
            id_field: crate::core::config::DEFAULT_ID_FIELD.to_string(),
        }
    }

    /// Local filesystem database rooted at `config.storage_path`
    pub fn open(config: &Config) -> Self {
        let persister = PersisterHandle::new(LocalPersister::new(config.storage_path.clone()));
        Database::new(persister).with_id_field(config.id_field.clone())
    }

    /// Field read by [`Database::set_document`] when no field is given
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn persister(&self) -> &PersisterHandle {
        &self.persister
    }

    pub fn metadata(&self) -> &MetaStore {
        &self.meta
    }

    // ─── Databases ──────────────────────────────────────────────────────

    pub async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.persister.list("", ListKind::Namespaces).await?.unwrap_or_default())
    }

    /// A database exists once its metadata record does
    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.meta.read(name).await?.is_some())
    }

    /// Create `name`, or overwrite its metadata if it already exists
    pub async fn create_database(&self, name: &str, meta: &Meta) -> Result<()> {
        self.meta.write(name, meta).await?;
        info!(database = name, protected = meta.is_protected(), "database created");
        Ok(())
    }

    /// Move the whole namespace of `old` to `new`, then store `meta` under `new`
    pub async fn rename_database(&self, old: &str, new: &str, meta: &Meta) -> Result<RenameOutcome> {
        let from = KeyScheme::database_key(old)?;
        let to = KeyScheme::database_key(new)?;

        let outcome = self.persister.rename_namespace(&from, &to).await?;
        if outcome == RenameOutcome::Renamed {
            self.meta.write(new, meta).await?;
            info!(from = old, to = new, "database renamed");
        }
        Ok(outcome)
    }

    /// Metadata of `name`, checked against the caller's token.
    ///
    /// Fails with `ErrorKind::AccessDenied` when the database is protected
    /// and `token` does not match.
    pub async fn meta(&self, name: &str, token: Option<&str>) -> Result<Option<Meta>> {
        match self.meta.read(name).await? {
            Some(meta) => {
                authorize(name, &meta, token)?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    pub async fn remove_database(&self, name: &str) -> Result<()> {
        let key = KeyScheme::database_key(name)?;
        self.persister.remove_namespace(&key).await?;
        info!(database = name, "database removed");
        Ok(())
    }

    /// Bytes stored for `name`, metadata included
    pub async fn database_size(&self, name: &str) -> Result<Option<u64>> {
        let key = KeyScheme::database_key(name)?;
        self.persister.namespace_size(&key).await
    }

    pub async fn request_count(&self, name: &str) -> Result<Option<RequestCount>> {
        self.meta.request_count(name).await
    }

    // ─── Collections ────────────────────────────────────────────────────

    pub async fn list_collections(&self, database: &str) -> Result<Option<Vec<String>>> {
        let key = KeyScheme::database_key(database)?;
        self.persister.list(&key, ListKind::Namespaces).await
    }

    /// Returns `false` if the database does not exist
    pub async fn create_collection(&self, database: &str, collection: &str) -> Result<bool> {
        let key = KeyScheme::collection_key(database, collection)?;
        if !self.database_exists(database).await? {
            return Ok(false);
        }

        self.persister.create_namespace(&key).await?;
        debug!(database, collection, "collection created");
        Ok(true)
    }

    /// Fails with `RenameOutcome::Conflict` when `new` already holds documents
    pub async fn rename_collection(&self, database: &str, old: &str, new: &str) -> Result<RenameOutcome> {
        let from = KeyScheme::collection_key(database, old)?;
        let to = KeyScheme::collection_key(database, new)?;
        self.persister.rename_namespace(&from, &to).await
    }

    pub async fn remove_collection(&self, database: &str, collection: &str) -> Result<()> {
        let key = KeyScheme::collection_key(database, collection)?;
        self.persister.remove_namespace(&key).await
    }

    // ─── Documents ──────────────────────────────────────────────────────

    /// Untyped model of one collection, sharing this database's subscribers
    pub fn collection(&self, database: &str, collection: &str) -> Result<Model<Value>> {
        Model::with_subscribers(self.persister.clone(), database, collection, self.subscribers.clone())
    }

    /// Typed model of one collection with its own subscriber registry.
    ///
    /// Its reads and writes are not metered.
    pub fn model<T>(&self, database: &str, collection: &str) -> Result<Model<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Model::new(self.persister.clone(), database, collection)
    }

    pub async fn list_documents(&self, database: &str, collection: &str) -> Result<Option<Vec<String>>> {
        self.collection(database, collection)?.ids().await
    }

    pub async fn get_document(&self, database: &str, collection: &str, id: &str) -> Result<Option<Value>> {
        let document = self.collection(database, collection)?.get(id).await?;
        if document.is_some() {
            self.meta.record_requests(database, 1, 0).await?;
        }
        Ok(document)
    }

    /// Store `document` and return its id.
    ///
    /// The id is the string or number under `id_field` (default: the
    /// database's id field). An empty string or zero counts as no id, and a
    /// fresh UUID not yet used in the collection is generated instead.
    pub async fn set_document(
        &self,
        database: &str,
        collection: &str,
        document: Value,
        id_field: Option<&str>,
    ) -> Result<String> {
        let model = self.collection(database, collection)?;
        let field = id_field.unwrap_or(&self.id_field);

        let id = match document.get(field) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) if id.as_f64() != Some(0.0) => id.to_string(),
            _ => generate_id(&model).await?,
        };

        model.set(&id, &document).await?;
        self.meta.record_requests(database, 0, 1).await?;
        Ok(id)
    }

    pub async fn remove_document(&self, database: &str, collection: &str, id: &str) -> Result<()> {
        self.collection(database, collection)?.remove(id).await
    }

    /// Watch one document; see [`Model::subscribe`]
    pub async fn subscribe<F>(&self, database: &str, collection: &str, id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.collection(database, collection)?.subscribe(id, callback).await
    }

    // ─── Queries ────────────────────────────────────────────────────────

    /// First document, in enumeration order, whose value at `path` matches
    pub async fn find_one(
        &self,
        database: &str,
        collection: &str,
        path: &str,
        tests: &TestSet,
    ) -> Result<Option<String>> {
        let mut found = self.scan(database, collection, path, tests, true).await?;
        Ok(found.pop())
    }

    /// Every document whose value at `path` matches, in enumeration order
    pub async fn find_all(
        &self,
        database: &str,
        collection: &str,
        path: &str,
        tests: &TestSet,
    ) -> Result<Vec<String>> {
        self.scan(database, collection, path, tests, false).await
    }

    /// Linear scan over the collection; each loaded document counts as a read
    async fn scan(
        &self,
        database: &str,
        collection: &str,
        path: &str,
        tests: &TestSet,
        first_only: bool,
    ) -> Result<Vec<String>> {
        let model = self.collection(database, collection)?;
        let ids = match model.ids().await? {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        let mut matched = Vec::new();
        let mut loaded = 0u64;
        for id in ids {
            let document = match model.get(&id).await? {
                Some(document) => document,
                None => continue,
            };
            loaded += 1;

            if document_matches(&document, path, tests) {
                matched.push(id);
                if first_only {
                    break;
                }
            }
        }

        if loaded > 0 {
            self.meta.record_requests(database, loaded, 0).await?;
        }
        Ok(matched)
    }
}

async fn generate_id(model: &Model<Value>) -> Result<String> {
    loop {
        let id = Uuid::new_v4().to_string();
        if !model.exists(&id).await? {
            return Ok(id);
        }
    }
}
