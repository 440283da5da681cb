pub mod core;
pub mod storage;
pub mod query;
pub mod document;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                               DEADBASE STRUCT ARCHITECTURE                                  │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Database                                       │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ persister: PersisterHandle        // Shared storage backend                  │ │    │
│  │  │ meta: MetaStore                   // Auth token + request counters           │ │    │
│  │  │ subscribers: Arc<SubscriberRegistry<Value>>  // Per-document callbacks       │ │    │
│  │  │ id_field: String                  // Field holding a document's id           │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────────────────────┐    │
│  │ struct Config    │  │ struct Meta      │  │ struct RequestCount                   │    │
│  │ • storage_path   │  │ • auth: Option<> │  │ • reads: u64                          │    │
│  │ • id_field       │  │ • requests       │  │ • writes: u64    // stored as "r:w"   │    │
│  └──────────────────┘  └──────────────────┘  └───────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐                                                 │
│  │ struct MetaStore │  │ fn authorize     │                                                 │
│  │ • persister      │  │ • db, meta, tok  │                                                 │
│  └──────────────────┘  └──────────────────┘                                                 │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── DOCUMENT LAYER ─────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────┐        ┌──────────────────────────────────────────┐        │
│  │ struct Model<T>            │        │ struct SubscriberRegistry<T>             │        │
│  │ • persister                │───────▶│ • subscribers: Mutex<HashMap<key, Vec>>  │        │
│  │ • database, collection     │        │ • next_token: AtomicU64                  │        │
│  │ • subscribers: Arc<>       │        └──────────────────────────────────────────┘        │
│  └────────────────────────────┘        ┌──────────────────────────────────────────┐        │
│                                         │ struct Subscription                      │        │
│                                         │ • key, cancel: Mutex<Option<FnOnce>>     │        │
│                                         └──────────────────────────────────────────┘        │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── QUERY LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────────┐  ┌──────────────────────────┐  ┌──────────────────────────┐  │
│  │ enum TestValue           │  │ struct TestSet           │  │ parse_test_values()      │  │
│  │ • Literal(String)        │  │ • values: Vec<TestValue> │  │ • "str:"  → Literal      │  │
│  │ • Pattern(Regex)         │  │ • matches(&Value)        │  │ • "regex:"→ Pattern      │  │
│  └──────────────────────────┘  └──────────────────────────┘  └──────────────────────────┘  │
│                                                                                              │
│  resolve_path(doc, "a.b.0") ──▶ document_matches(doc, path, tests)                           │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── STORAGE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │ trait Persister  (setup → State, get/set/remove, list, namespace ops)              │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│            │                                    │                                            │
│  ┌─────────▼──────────────┐        ┌────────────▼─────────────┐  ┌──────────────────────┐  │
│  │ struct LocalPersister  │        │ struct RemotePersister<C>│  │ struct PersisterHandle│ │
│  │ • directory: PathBuf   │        │ • client: Arc<C: KvClient>│ │ • Arc<dyn Erased>    │  │
│  │   <root>/<db>/meta.json│        │ • table_name             │  │ • OnceCell<State>    │  │
│  │   <root>/<db>/<c>/<id> │        │   items { I: key, D: B } │  │   (single-flight)    │  │
│  └────────────────────────┘        └──────────────────────────┘  └──────────────────────┘  │
│                                                                                              │
│  ┌────────────────────────┐                                                                  │
│  │ struct KeyScheme       │   "db/meta.json", "db/coll", "db/coll/id"                        │
│  └────────────────────────┘                                                                  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
