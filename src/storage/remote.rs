use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::info;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::persister::Persister;

/// Table attribute holding the persister key
pub const KEY_ATTRIBUTE: &str = "I";
/// Table attribute holding the stored bytes
pub const DATA_ATTRIBUTE: &str = "D";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

impl AttributeType {
    /// Wire code used by key/value services (`S`, `N`, `B`)
    pub fn code(&self) -> &'static str {
        match self {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        AttributeDefinition { name: name.into(), attribute_type }
    }
}

/// What the service reports about an existing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub attribute_definitions: Option<Vec<AttributeDefinition>>,
    pub hash_key: String,
}

/// Request to create a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub hash_key: String,
    pub read_capacity: u64,
    pub write_capacity: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(Bytes),
}

pub type Item = HashMap<String, AttributeValue>;

/// Minimal table API of a remote key/value service.
///
/// SDK bindings implement this; [`MemoryKvClient`] is the in-process one.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// `None` when the table does not exist
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>>;

    async fn create_table(&self, spec: TableSpec) -> Result<()>;

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>>;

    async fn put_item(&self, table: &str, item: Item) -> Result<()>;

    async fn delete_item(&self, table: &str, key: Item) -> Result<()>;
}

/// Persister storing each value as one item of a single remote table
pub struct RemotePersister<C: KvClient> {
    client: Arc<C>,
    table_name: String,
}

impl<C: KvClient> RemotePersister<C> {
    pub fn new(client: C, table_name: impl Into<String>) -> Self {
        Self::with_shared_client(Arc::new(client), table_name)
    }

    /// Share one client between the persister and other callers
    pub fn with_shared_client(client: Arc<C>, table_name: impl Into<String>) -> Self {
        RemotePersister {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key_item(key: &str) -> Item {
        HashMap::from([(KEY_ATTRIBUTE.to_string(), AttributeValue::S(key.to_string()))])
    }

    fn table_spec(&self) -> TableSpec {
        TableSpec {
            name: self.table_name.clone(),
            attribute_definitions: vec![AttributeDefinition::new(KEY_ATTRIBUTE, AttributeType::String)],
            hash_key: KEY_ATTRIBUTE.to_string(),
            read_capacity: 1,
            write_capacity: 1,
        }
    }

    fn verify_schema(&self, description: &TableDescription) -> Result<()> {
        let table = &self.table_name;
        let definitions = description.attribute_definitions.as_ref().ok_or_else(|| {
            Error::schema(format!(
                "table {} was already created, but expected it to have attribute definitions",
                table
            ))
        })?;

        let key = definitions
            .iter()
            .find(|definition| definition.name == KEY_ATTRIBUTE)
            .ok_or_else(|| {
                Error::schema(format!(
                    "table {} was already created, but expected it to have an '{}' attribute",
                    table, KEY_ATTRIBUTE
                ))
            })?;

        if key.attribute_type != AttributeType::String {
            return Err(Error::schema(format!(
                "table {} was already created, but expected its '{}' field to be of type {} (found {})",
                table,
                KEY_ATTRIBUTE,
                AttributeType::String.code(),
                key.attribute_type.code()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl<C: KvClient> Persister for RemotePersister<C> {
    type State = Arc<C>;

    fn name(&self) -> &'static str {
        "remote"
    }

    async fn setup(&self) -> Result<Arc<C>> {
        match self.client.describe_table(&self.table_name).await? {
            None => {
                self.client.create_table(self.table_spec()).await?;
                info!(table = %self.table_name, "created backing table");
            }
            Some(description) => self.verify_schema(&description)?,
        }

        Ok(self.client.clone())
    }

    async fn get(&self, client: &Arc<C>, key: &str) -> Result<Option<Bytes>> {
        let item = match client.get_item(&self.table_name, Self::key_item(key)).await? {
            Some(item) => item,
            None => return Ok(None),
        };

        match item.get(DATA_ATTRIBUTE) {
            Some(AttributeValue::B(data)) => Ok(Some(data.clone())),
            _ => Err(Error::schema(format!(
                "table {} is misconfigured, expected field '{}' to be specified as binary",
                self.table_name, DATA_ATTRIBUTE
            ))),
        }
    }

    async fn set(&self, client: &Arc<C>, key: &str, bytes: Bytes) -> Result<()> {
        let mut item = Self::key_item(key);
        item.insert(DATA_ATTRIBUTE.to_string(), AttributeValue::B(bytes));
        client.put_item(&self.table_name, item).await
    }

    async fn remove(&self, client: &Arc<C>, key: &str) -> Result<()> {
        client.delete_item(&self.table_name, Self::key_item(key)).await
    }
}

struct MemoryTable {
    description: TableDescription,
    items: HashMap<String, Item>,
}

/// In-process [`KvClient`] keeping every table in memory
#[derive(Default)]
pub struct MemoryKvClient {
    tables: RwLock<HashMap<String, MemoryTable>>,
    tables_created: AtomicUsize,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing (possibly incompatible) table
    pub fn with_table(self, description: TableDescription) -> Self {
        self.tables.write().insert(
            description.name.clone(),
            MemoryTable { description, items: HashMap::new() },
        );
        self
    }

    /// Store a raw item, bypassing any persister
    pub fn insert_raw(&self, table: &str, item: Item) -> Result<()> {
        let key = Self::hash_value(&self.tables.read(), table, &item)?;
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        entry.items.insert(key, item);
        Ok(())
    }

    /// Number of `create_table` calls served
    pub fn tables_created(&self) -> usize {
        self.tables_created.load(Ordering::SeqCst)
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map(|t| t.items.len()).unwrap_or(0)
    }

    fn missing(table: &str) -> Error {
        Error::new(ErrorKind::Io, format!("requested table {} does not exist", table))
    }

    fn hash_value(tables: &HashMap<String, MemoryTable>, table: &str, item: &Item) -> Result<String> {
        let entry = tables.get(table).ok_or_else(|| Self::missing(table))?;
        match item.get(&entry.description.hash_key) {
            Some(AttributeValue::S(value)) | Some(AttributeValue::N(value)) => Ok(value.clone()),
            _ => Err(Error::invalid_argument(format!(
                "item is missing hash key '{}' of table {}",
                entry.description.hash_key, table
            ))),
        }
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>> {
        Ok(self.tables.read().get(table).map(|t| t.description.clone()))
    }

    async fn create_table(&self, spec: TableSpec) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&spec.name) {
            return Err(Error::new(ErrorKind::Io, format!("table {} already exists", spec.name)));
        }

        let description = TableDescription {
            name: spec.name.clone(),
            attribute_definitions: Some(spec.attribute_definitions),
            hash_key: spec.hash_key,
        };
        tables.insert(spec.name, MemoryTable { description, items: HashMap::new() });
        self.tables_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let tables = self.tables.read();
        let hash = Self::hash_value(&tables, table, &key)?;
        Ok(tables.get(table).and_then(|t| t.items.get(&hash).cloned()))
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<()> {
        let mut tables = self.tables.write();
        let hash = Self::hash_value(&tables, table, &item)?;
        if let Some(entry) = tables.get_mut(table) {
            entry.items.insert(hash, item);
        }
        Ok(())
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<()> {
        let mut tables = self.tables.write();
        let hash = Self::hash_value(&tables, table, &key)?;
        if let Some(entry) = tables.get_mut(table) {
            entry.items.remove(&hash);
        }
        Ok(())
    }
}
