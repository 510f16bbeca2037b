/// SQLite-backed document store.
/// Documents are stored as JSON text; field filters run through JSON1's
/// `json_extract`, and batches commit inside a single transaction.
use super::{
    ensure_object, merge_fields, validate_collection, validate_field, DbPool, DocPath, Document,
    DocumentChange, DocumentStore, Query, WriteBatch, WriteOp,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn read_data(conn: &Connection, path: &DocPath) -> StoreResult<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![path.collection(), path.id()],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn write_data(conn: &Connection, path: &DocPath, data: &Value) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO documents (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![path.collection(), path.id(), data.to_string(), Utc::now()],
    )?;
    Ok(())
}

fn remove(conn: &Connection, path: &DocPath) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
        params![path.collection(), path.id()],
    )?;
    Ok(())
}

fn apply_set(conn: &Connection, path: &DocPath, data: Value) -> StoreResult<DocumentChange> {
    ensure_object(path, &data)?;
    let before = read_data(conn, path)?;
    write_data(conn, path, &data)?;
    Ok(DocumentChange {
        before,
        after: Some(data),
    })
}

fn apply_update(
    conn: &Connection,
    path: &DocPath,
    fields: Map<String, Value>,
) -> StoreResult<DocumentChange> {
    let before = read_data(conn, path)?.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
    let after = merge_fields(before.clone(), fields);
    write_data(conn, path, &after)?;
    Ok(DocumentChange {
        before: Some(before),
        after: Some(after),
    })
}

fn apply_delete(conn: &Connection, path: &DocPath) -> StoreResult<DocumentChange> {
    let before = read_data(conn, path)?;
    if before.is_some() {
        remove(conn, path)?;
    }
    Ok(DocumentChange {
        before,
        after: None,
    })
}

/// JSON scalar to SQL value, matching what `json_extract` yields.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn collect_documents(
    conn: &Connection,
    sql: &str,
    collection: &str,
    args: Vec<SqlValue>,
) -> StoreResult<Vec<Document>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(args), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, raw)| {
            Ok(Document {
                path: DocPath::new(collection, id),
                data: serde_json::from_str(&raw)?,
            })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let conn = self.pool.lock().await;
        Ok(read_data(&conn, path)?.map(|data| Document {
            path: path.clone(),
            data,
        }))
    }

    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<DocumentChange> {
        let conn = self.pool.lock().await;
        apply_set(&conn, path, data)
    }

    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<DocumentChange> {
        let conn = self.pool.lock().await;
        apply_update(&conn, path, fields)
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<DocumentChange> {
        let conn = self.pool.lock().await;
        apply_delete(&conn, path)
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;
        let conn = self.pool.lock().await;
        collect_documents(
            &conn,
            "SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id",
            collection,
            vec![SqlValue::Text(collection.to_string())],
        )
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        validate_collection(&query.collection)?;

        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?1");
        let mut args = vec![SqlValue::Text(query.collection.clone())];
        for filter in &query.filters {
            validate_field(&filter.field)?;
            let path_idx = args.len() + 1;
            let value_idx = args.len() + 2;
            sql.push_str(&format!(
                " AND json_extract(data, ?{}) {} ?{}",
                path_idx,
                filter.op.as_sql(),
                value_idx
            ));
            args.push(SqlValue::Text(format!("$.{}", filter.field)));
            args.push(to_sql_value(&filter.value));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.pool.lock().await;
        collect_documents(&conn, &sql, &query.collection, args)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut conn = self.pool.lock().await;
        let tx = conn.transaction()?;

        for op in batch.into_ops() {
            match op {
                WriteOp::Set(path, data) => {
                    apply_set(&tx, &path, data)?;
                }
                WriteOp::Update(path, fields) => {
                    apply_update(&tx, &path, fields)?;
                }
                WriteOp::Delete(path) => {
                    apply_delete(&tx, &path)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, Filter};
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::new(create_test_pool())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = store();
        let path = DocPath::new("users", "alice");

        let change = store
            .set(&path, json!({"name": "Alice"}))
            .await
            .expect("Failed to set");
        assert!(change.before.is_none());

        let doc = store
            .get(&path)
            .await
            .expect("Failed to get")
            .expect("Document not found");
        assert_eq!(doc.data, json!({"name": "Alice"}));
        assert_eq!(doc.id(), "alice");
    }

    #[tokio::test]
    async fn test_set_rejects_non_object() {
        let store = store();
        let result = store.set(&DocPath::new("users", "alice"), json!([1, 2])).await;
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_update_merges_and_reports_before() {
        let store = store();
        let path = DocPath::new("users", "bob");
        store
            .set(&path, json!({"name": "Bob", "fcmToken": "t1"}))
            .await
            .expect("Failed to set");

        let mut fields = Map::new();
        fields.insert("avgRating".to_string(), json!(4.5));
        let change = store.update(&path, fields).await.expect("Failed to update");

        assert_eq!(change.before, Some(json!({"name": "Bob", "fcmToken": "t1"})));
        assert_eq!(
            change.after,
            Some(json!({"name": "Bob", "fcmToken": "t1", "avgRating": 4.5}))
        );
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = store();
        let result = store.update(&DocPath::new("users", "ghost"), Map::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        let path = DocPath::new("raves", "r1");
        store.set(&path, json!({"name": "r"})).await.expect("Failed to set");

        let change = store.delete(&path).await.expect("Failed to delete");
        assert!(change.before.is_some());
        assert!(store.get(&path).await.expect("Failed to get").is_none());

        let again = store.delete(&path).await.expect("Deleting twice should succeed");
        assert!(again.before.is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_collection() {
        let store = store();
        store
            .set(&DocPath::new("users/a/receivedRatings", "x"), json!({"rating": 4.0}))
            .await
            .expect("Failed to set");
        store
            .set(&DocPath::new("users/a/receivedRatings", "y"), json!({"rating": 2.0}))
            .await
            .expect("Failed to set");
        store
            .set(&DocPath::new("users/b/receivedRatings", "x"), json!({"rating": 5.0}))
            .await
            .expect("Failed to set");

        let docs = store.list("users/a/receivedRatings").await.expect("Failed to list");
        let ids: Vec<&str> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = store();
        store
            .set(&DocPath::new("group_chats", "old"), json!({"autoDeleteAt": 100, "isActive": true}))
            .await
            .expect("Failed to set");
        store
            .set(&DocPath::new("group_chats", "inactive"), json!({"autoDeleteAt": 100, "isActive": false}))
            .await
            .expect("Failed to set");
        store
            .set(&DocPath::new("group_chats", "fresh"), json!({"autoDeleteAt": 900, "isActive": true}))
            .await
            .expect("Failed to set");
        store
            .set(&DocPath::new("group_chats", "forever"), json!({"isActive": true}))
            .await
            .expect("Failed to set");

        let query = Query::new("group_chats")
            .filter(Filter::lt("autoDeleteAt", 500))
            .filter(Filter::eq("isActive", true));
        let docs = store.query(&query).await.expect("Failed to query");

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), "old");
    }

    #[tokio::test]
    async fn test_query_rejects_bad_field() {
        let store = store();
        let query = Query::new("raves").filter(Filter::eq("a') OR 1=1 --", 1));
        assert!(matches!(store.query(&query).await, Err(StoreError::InvalidField(_))));
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let store = store();
        let keep = DocPath::new("raves", "keep");
        store.set(&keep, json!({"name": "keep"})).await.expect("Failed to set");

        let mut batch = WriteBatch::new();
        batch.delete(keep.clone());
        batch.update(DocPath::new("group_chats", "missing"), Map::new());

        assert!(store.commit(batch).await.is_err());
        // The delete was rolled back with the failing update
        assert!(store.get(&keep).await.expect("Failed to get").is_some());
    }

    #[tokio::test]
    async fn test_commit_applies_all_ops() {
        let store = store();
        let chat = DocPath::new("group_chats", "g1");
        let msg = DocPath::new(chat.sub_collection("messages"), "m1");
        store.set(&chat, json!({"isActive": true})).await.expect("Failed to set");
        store.set(&msg, json!({"text": "hi"})).await.expect("Failed to set");

        let mut fields = Map::new();
        fields.insert("isActive".to_string(), json!(false));
        let mut batch = WriteBatch::new();
        batch.update(chat.clone(), fields).delete(msg.clone());
        store.commit(batch).await.expect("Failed to commit");

        let chat_doc = store.get(&chat).await.expect("Failed to get").expect("Missing chat");
        assert_eq!(chat_doc.data["isActive"], json!(false));
        assert!(store.get(&msg).await.expect("Failed to get").is_none());
    }
}
