/// Document store layer.
/// Documents are JSON objects addressed by `collection/id` paths, where a
/// collection may itself live under a document (`users/u1/receivedRatings`).
/// Two backends implement [`DocumentStore`]: SQLite for the service and an
/// in-memory map for tests and local tooling.

pub mod collections;
pub mod init;
pub mod memory;
pub mod models;
pub mod sqlite;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rusqlite::{Connection, Result as SqliteResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use collections::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type DbPool = Arc<Mutex<Connection>>;

/// Create a connection pool (simplified for single-threaded SQLite)
pub fn create_pool(db_path: &str) -> SqliteResult<DbPool> {
    let conn = Connection::open(db_path)?;
    init::initialize_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create an in-memory database for testing
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DocPath {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parse `a/b/c/d` style paths. Documents sit at an even segment count.
    pub fn parse(path: &str) -> StoreResult<Self> {
        let segments = split_segments(path)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "{} does not address a document",
                path
            )));
        }
        let (id, collection) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        Ok(DocPath::new(collection.join("/"), *id))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of a collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> String {
        format!("{}/{}/{}", self.collection, self.id, name)
    }

    pub fn segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.collection.split('/').collect();
        segments.push(&self.id);
        segments
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Check that `path` addresses a collection (odd segment count).
pub fn validate_collection(path: &str) -> StoreResult<()> {
    let segments = split_segments(path)?;
    if segments.len() % 2 != 1 {
        return Err(StoreError::InvalidPath(format!(
            "{} does not address a collection",
            path
        )));
    }
    Ok(())
}

fn split_segments(path: &str) -> StoreResult<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    if trimmed.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Before/after state of a single write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentChange {
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
}

impl FilterOp {
    fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Lt => "<",
        }
    }
}

/// Field predicate. Documents missing the field never match.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter {
            field: field.to_string(),
            op: FilterOp::Lt,
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => actual == &self.value,
            },
            FilterOp::Lt => match (actual, &self.value) {
                (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => a < b,
                    _ => false,
                },
                (Value::String(a), Value::String(b)) => a < b,
                _ => false,
            },
        }
    }
}

pub(crate) fn validate_field(field: &str) -> StoreResult<()> {
    let valid = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Query {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set(DocPath, Value),
    Update(DocPath, Map<String, Value>),
    Delete(DocPath),
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set(path, _) | WriteOp::Update(path, _) | WriteOp::Delete(path) => path,
        }
    }
}

/// Mutations applied all-or-nothing by [`DocumentStore::commit`].
/// An update of a missing document fails the whole batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set(path, data));
        self
    }

    pub fn update(&mut self, path: DocPath, fields: Map<String, Value>) -> &mut Self {
        self.ops.push(WriteOp::Update(path, fields));
        self
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.ops.push(WriteOp::Delete(path));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Shallow merge of `fields` into an existing object.
pub(crate) fn merge_fields(existing: Value, fields: Map<String, Value>) -> Value {
    let mut object = match existing {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.extend(fields);
    Value::Object(object)
}

pub(crate) fn ensure_object(path: &DocPath, data: &Value) -> StoreResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(format!(
            "{} must be a JSON object",
            path
        )))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Create or replace a document.
    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<DocumentChange>;

    /// Merge top-level fields into an existing document.
    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<DocumentChange>;

    /// Remove a document. Removing a missing document is not an error.
    async fn delete(&self, path: &DocPath) -> StoreResult<DocumentChange>;

    /// All documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
