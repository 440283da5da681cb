//! Backend behaviour: remote table setup and schema checks, local layout.

use deadbase::core::database::Database;
use deadbase::core::error::ErrorKind;
use deadbase::core::types::{Meta, RequestCount};
use deadbase::storage::local::LocalPersister;
use deadbase::storage::persister::{ListKind, PersisterHandle, RenameOutcome};
use deadbase::storage::remote::{
    AttributeDefinition, AttributeType, AttributeValue, MemoryKvClient, RemotePersister,
    TableDescription, DATA_ATTRIBUTE, KEY_ATTRIBUTE,
};

use bytes::Bytes;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempfile::tempdir;

// ─── Helpers ─────────────────────────────────────────────────────────────────

const TABLE: &str = "documents";

fn remote(client: &Arc<MemoryKvClient>) -> PersisterHandle {
    PersisterHandle::new(RemotePersister::with_shared_client(client.clone(), TABLE))
}

fn existing_table(definitions: Option<Vec<AttributeDefinition>>) -> MemoryKvClient {
    MemoryKvClient::new().with_table(TableDescription {
        name: TABLE.to_string(),
        attribute_definitions: definitions,
        hash_key: KEY_ATTRIBUTE.to_string(),
    })
}

// ─── Remote ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_creates_its_table_once() {
    let client = Arc::new(MemoryKvClient::new());
    let handle = remote(&client);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("shop/users/{}", i);
            handle.set(&key, Bytes::from_static(b"{}")).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(client.tables_created(), 1);
    assert_eq!(client.item_count(TABLE), 4);
    assert_eq!(handle.get("shop/users/2").await.unwrap(), Some(Bytes::from_static(b"{}")));

    handle.remove("shop/users/2").await.unwrap();
    handle.remove("shop/users/2").await.unwrap();
    assert_eq!(handle.get("shop/users/2").await.unwrap(), None);
}

#[tokio::test]
async fn remote_accepts_a_compatible_table() {
    let client = Arc::new(existing_table(Some(vec![
        AttributeDefinition::new(KEY_ATTRIBUTE, AttributeType::String),
        AttributeDefinition::new("extra", AttributeType::Number),
    ])));
    let handle = remote(&client);

    handle.ready().await.unwrap();
    assert_eq!(client.tables_created(), 0);
}

#[tokio::test]
async fn remote_rejects_a_table_without_attribute_definitions() {
    let client = Arc::new(existing_table(None));
    let err = remote(&client).ready().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Schema);
    assert!(err.context.contains("attribute definitions"));
}

#[tokio::test]
async fn remote_rejects_a_table_without_the_key_attribute() {
    let client = Arc::new(existing_table(Some(vec![AttributeDefinition::new(
        "pk",
        AttributeType::String,
    )])));
    let err = remote(&client).ready().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Schema);
    assert!(err.context.contains("'I'"));
}

#[tokio::test]
async fn remote_rejects_a_key_attribute_of_the_wrong_type() {
    let client = Arc::new(existing_table(Some(vec![AttributeDefinition::new(
        KEY_ATTRIBUTE,
        AttributeType::Number,
    )])));
    let handle = remote(&client);

    let err = handle.get("shop/users/1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
    assert!(err.context.contains("type S"));

    // The failed setup is what every later call sees
    assert!(handle.set("shop/users/1", Bytes::new()).await.unwrap_err().is(ErrorKind::Schema));
}

#[tokio::test]
async fn remote_rejects_non_binary_data() {
    let client = Arc::new(MemoryKvClient::new());
    let handle = remote(&client);
    handle.ready().await.unwrap();

    let item = HashMap::from([
        (KEY_ATTRIBUTE.to_string(), AttributeValue::S("shop/users/1".to_string())),
        (DATA_ATTRIBUTE.to_string(), AttributeValue::S("{}".to_string())),
    ]);
    client.insert_raw(TABLE, item).unwrap();

    let err = handle.get("shop/users/1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
    assert!(err.context.contains("binary"));
}

#[tokio::test]
async fn remote_cannot_enumerate_namespaces() {
    let client = Arc::new(MemoryKvClient::new());
    let db = Database::new(remote(&client));

    assert!(db.list_databases().await.unwrap_err().is(ErrorKind::Unsupported));
    assert!(db.list_collections("shop").await.unwrap_err().is(ErrorKind::Unsupported));
    assert!(db.rename_collection("shop", "a", "b").await.unwrap_err().is(ErrorKind::Unsupported));
    assert!(db.remove_database("shop").await.unwrap_err().is(ErrorKind::Unsupported));

    // Key-addressed operations still work
    db.create_database("shop", &Meta::public()).await.unwrap();
    db.set_document("shop", "users", json!({ "id": "u1" }), None).await.unwrap();
    assert_eq!(db.get_document("shop", "users", "u1").await.unwrap(), Some(json!({ "id": "u1" })));
    assert_eq!(db.request_count("shop").await.unwrap(), Some(RequestCount::new(1, 1)));
}

#[tokio::test]
async fn generated_ids_are_unique() {
    let client = Arc::new(MemoryKvClient::new());
    let db = Database::new(remote(&client));

    let mut ids = HashSet::new();
    for n in 0..10_000 {
        let id = db.set_document("load", "events", json!({ "n": n }), None).await.unwrap();
        ids.insert(id);
    }

    assert_eq!(ids.len(), 10_000);
    assert_eq!(client.item_count(TABLE), 10_000);
}

// ─── Local ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn local_keys_map_onto_nested_paths() {
    let dir = tempdir().unwrap();
    let handle = PersisterHandle::new(LocalPersister::new(dir.path()));

    handle.set("shop/users/42", &b"{\"a\":1}"[..]).await.unwrap();
    handle.set("shop/meta.json", &b"{}"[..]).await.unwrap();

    let on_disk = std::fs::read(dir.path().join("shop").join("users").join("42")).unwrap();
    assert_eq!(on_disk, b"{\"a\":1}");

    assert_eq!(handle.list("shop", ListKind::Namespaces).await.unwrap(), Some(vec!["users".to_string()]));
    assert_eq!(handle.list("shop", ListKind::Values).await.unwrap(), Some(vec!["meta.json".to_string()]));
    assert_eq!(handle.list("shop/users/42", ListKind::Values).await.unwrap(), None);
    assert_eq!(handle.namespace_size("shop/users/42").await.unwrap(), Some(7));
}

#[tokio::test]
async fn local_rename_reports_missing_sources() {
    let dir = tempdir().unwrap();
    let handle = PersisterHandle::new(LocalPersister::new(dir.path()));

    assert_eq!(handle.rename_namespace("ghost", "other").await.unwrap(), RenameOutcome::SourceMissing);

    handle.set("shop/users/1", &b"1"[..]).await.unwrap();
    assert_eq!(handle.rename_namespace("shop", "shop").await.unwrap(), RenameOutcome::Renamed);
    assert_eq!(handle.get("shop/users/1").await.unwrap(), Some(Bytes::from_static(b"1")));
}

#[tokio::test]
async fn local_refuses_to_remove_its_root() {
    let dir = tempdir().unwrap();
    let handle = PersisterHandle::new(LocalPersister::new(dir.path()));
    handle.set("shop/users/1", &b"1"[..]).await.unwrap();

    let err = handle.remove_namespace("").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(dir.path().join("shop").exists());

    assert!(handle.get("shop/../../etc").await.unwrap_err().is(ErrorKind::InvalidArgument));
    assert!(handle.remove_namespace(".staging").await.unwrap_err().is(ErrorKind::InvalidArgument));
}

#[tokio::test]
async fn local_overwrite_replaces_the_whole_value() {
    let dir = tempdir().unwrap();
    let handle = PersisterHandle::new(LocalPersister::new(dir.path()));

    handle.set("shop/users/1", vec![b'a'; 4096]).await.unwrap();
    handle.set("shop/users/1", &b"short"[..]).await.unwrap();

    assert_eq!(handle.get("shop/users/1").await.unwrap(), Some(Bytes::from_static(b"short")));
    assert_eq!(std::fs::read_dir(dir.path().join(".staging")).unwrap().count(), 0);
    assert_eq!(handle.list("", ListKind::Namespaces).await.unwrap(), Some(vec!["shop".to_string()]));
}
