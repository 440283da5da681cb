use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::document::subscription::{Callback, SubscriberRegistry, Subscription};
use crate::storage::layout::KeyScheme;
use crate::storage::persister::{ListKind, PersisterHandle};

/// Typed JSON documents of one collection.
///
/// Writes and removals notify the subscribers of the touched id once the
/// persister call has returned. Clones share the same subscriber registry.
pub struct Model<T> {
    persister: PersisterHandle,
    database: String,
    collection: String,
    subscribers: Arc<SubscriberRegistry<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Model<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(persister: PersisterHandle, database: &str, collection: &str) -> Result<Self> {
        Self::with_subscribers(persister, database, collection, Arc::new(SubscriberRegistry::new()))
    }

    /// Share `subscribers` with other models, keyed by full document key
    pub fn with_subscribers(
        persister: PersisterHandle,
        database: &str,
        collection: &str,
        subscribers: Arc<SubscriberRegistry<T>>,
    ) -> Result<Self> {
        KeyScheme::collection_key(database, collection)?;

        Ok(Model {
            persister,
            database: database.to_string(),
            collection: collection.to_string(),
            subscribers,
            _marker: PhantomData,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Persister key of document `id`
    pub fn key(&self, id: &str) -> Result<String> {
        KeyScheme::document_key(&self.database, &self.collection, id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let key = self.key(id)?;
        match self.persister.get(&key).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let key = self.key(id)?;
        Ok(self.persister.get(&key).await?.is_some())
    }

    /// Overwrite document `id`, then notify its subscribers
    pub async fn set(&self, id: &str, value: &T) -> Result<()> {
        let key = self.key(id)?;
        let bytes = serde_json::to_vec(value)?;
        self.persister.set(&key, Bytes::from(bytes)).await?;

        let notified = self.subscribers.notify(&key, Some(value));
        debug!(key = %key, notified, "document written");
        Ok(())
    }

    /// Delete document `id` (missing ids included), then notify its subscribers
    pub async fn remove(&self, id: &str) -> Result<()> {
        let key = self.key(id)?;
        self.persister.remove(&key).await?;

        let notified = self.subscribers.notify(&key, None);
        debug!(key = %key, notified, "document removed");
        Ok(())
    }

    /// Ids stored in this collection, `None` if the collection does not exist
    pub async fn ids(&self) -> Result<Option<Vec<String>>> {
        let prefix = KeyScheme::collection_key(&self.database, &self.collection)?;
        self.persister.list(&prefix, ListKind::Values).await
    }

    /// Watch document `id`.
    ///
    /// The callback first receives the current value (or `None`), then every
    /// later `set` and `remove` of this id made through a model sharing this
    /// registry. A write that lands while the current value is being read
    /// makes the read start over, so the first delivery is never older than
    /// a write already announced.
    pub async fn subscribe<F>(&self, id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        let key = self.key(id)?;
        let callback: Callback<T> = Arc::new(callback);
        let subscription = self.subscribers.register_pending(&key, callback);

        loop {
            let current = match self.get(id).await {
                Ok(current) => current,
                Err(err) => {
                    subscription.unsubscribe();
                    return Err(err);
                }
            };

            if self.subscribers.activate(&subscription, current.as_ref()) {
                return Ok(subscription);
            }
            debug!(key = %key, "document changed while subscribing, reading again");
        }
    }

    pub fn subscriber_count(&self, id: &str) -> Result<usize> {
        Ok(self.subscribers.subscriber_count(&self.key(id)?))
    }
}

impl<T> Clone for Model<T> {
    fn clone(&self) -> Self {
        Model {
            persister: self.persister.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            subscribers: self.subscribers.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("persister", &self.persister)
            .finish()
    }
}

/// Parse stored bytes as UTF-8 JSON
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        Error::new(ErrorKind::Parse, format!("document {} is not valid UTF-8: {}", key, e))
    })?;

    serde_json::from_str(text).map_err(|e| {
        Error::new(ErrorKind::Parse, format!("document {} is not valid JSON: {}", key, e))
    })
}
