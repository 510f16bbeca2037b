/// In-memory document store, used by tests and the `--in-memory` mode.
/// Semantics mirror the SQLite store: ordered listings, shallow merges,
/// and all-or-nothing batches.
use super::{
    ensure_object, merge_fields, validate_collection, validate_field, DocPath, Document,
    DocumentChange, DocumentStore, Query, WriteBatch, WriteOp,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored directly in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |docs| docs.len())
    }
}

fn read(collections: &Collections, path: &DocPath) -> Option<Value> {
    collections
        .get(path.collection())
        .and_then(|docs| docs.get(path.id()))
        .cloned()
}

fn apply(collections: &mut Collections, op: WriteOp) -> StoreResult<DocumentChange> {
    match op {
        WriteOp::Set(path, data) => {
            ensure_object(&path, &data)?;
            let before = collections
                .entry(path.collection().to_string())
                .or_default()
                .insert(path.id().to_string(), data.clone());
            Ok(DocumentChange {
                before,
                after: Some(data),
            })
        }
        WriteOp::Update(path, fields) => {
            let slot = collections
                .get_mut(path.collection())
                .and_then(|docs| docs.get_mut(path.id()))
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            let before = slot.clone();
            let after = merge_fields(before.clone(), fields);
            *slot = after.clone();
            Ok(DocumentChange {
                before: Some(before),
                after: Some(after),
            })
        }
        WriteOp::Delete(path) => {
            let before = collections
                .get_mut(path.collection())
                .and_then(|docs| docs.remove(path.id()));
            Ok(DocumentChange {
                before,
                after: None,
            })
        }
    }
}

/// Put back the value a document had before a write.
fn restore(collections: &mut Collections, path: &DocPath, before: Option<Value>) {
    match before {
        Some(data) => {
            collections
                .entry(path.collection().to_string())
                .or_default()
                .insert(path.id().to_string(), data);
        }
        None => {
            if let Some(docs) = collections.get_mut(path.collection()) {
                docs.remove(path.id());
                if docs.is_empty() {
                    collections.remove(path.collection());
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(read(&collections, path).map(|data| Document {
            path: path.clone(),
            data,
        }))
    }

    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<DocumentChange> {
        let mut collections = self.collections.write().await;
        apply(&mut collections, WriteOp::Set(path.clone(), data))
    }

    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<DocumentChange> {
        let mut collections = self.collections.write().await;
        apply(&mut collections, WriteOp::Update(path.clone(), fields))
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<DocumentChange> {
        let mut collections = self.collections.write().await;
        apply(&mut collections, WriteOp::Delete(path.clone()))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.query(&Query::new(collection)).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        validate_collection(&query.collection)?;
        for filter in &query.filters {
            validate_field(&filter.field)?;
        }

        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                path: DocPath::new(query.collection.clone(), id.clone()),
                data: data.clone(),
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        // Prior values of touched documents, replayed in reverse on failure
        let mut undo: Vec<(DocPath, Option<Value>)> = Vec::new();
        for op in batch.into_ops() {
            let path = op.path().clone();
            match apply(&mut collections, op) {
                Ok(change) => undo.push((path, change.before)),
                Err(e) => {
                    for (path, before) in undo.into_iter().rev() {
                        restore(&mut collections, &path, before);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
