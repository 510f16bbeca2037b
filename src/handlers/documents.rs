/// Document API handlers.
/// Clients write through these endpoints; every write that changes a
/// document is handed to the trigger dispatcher.
use crate::db::{validate_collection, DocPath, Document, DocumentChange};
use crate::error::{FunctionError, Result};
use crate::functions::Functions;
use crate::triggers::{DocumentEvent, TriggerDispatcher};
use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub path: String,
    pub data: Value,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        DocumentResponse {
            path: doc.path.to_string(),
            data: doc.data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub documents: Vec<DocumentResponse>,
}

fn emit(dispatcher: &TriggerDispatcher, path: DocPath, change: DocumentChange) {
    if let Some(event) = DocumentEvent::from_change(path, change) {
        log::debug!("Document event {:?} on {}", event.kind, event.path);
        dispatcher.spawn(event);
    }
}

fn written(path: &DocPath, change: &DocumentChange) -> DocumentResponse {
    DocumentResponse {
        path: path.to_string(),
        data: change.after.clone().unwrap_or(Value::Null),
    }
}

/// Fetch a document, or list a collection
/// GET /v1/documents/{path}
pub async fn get_document(functions: web::Data<Functions>, path: web::Path<String>) -> Result<HttpResponse> {
    let raw = path.into_inner();

    if validate_collection(&raw).is_ok() {
        let documents = functions.store().list(raw.trim_matches('/')).await?;
        return Ok(HttpResponse::Ok().json(ListResponse {
            documents: documents.into_iter().map(DocumentResponse::from).collect(),
        }));
    }

    let doc_path = DocPath::parse(&raw)?;
    match functions.store().get(&doc_path).await? {
        Some(doc) => Ok(HttpResponse::Ok().json(DocumentResponse::from(doc))),
        None => Err(FunctionError::NotFound(format!("Document not found: {}", doc_path))),
    }
}

/// Create a document with a generated id
/// POST /v1/documents/{collection}
pub async fn create_document(
    functions: web::Data<Functions>,
    dispatcher: web::Data<TriggerDispatcher>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    let collection = path.into_inner();
    validate_collection(&collection)?;

    let doc_path = DocPath::new(collection.trim_matches('/'), uuid::Uuid::new_v4().to_string());
    let change = functions.store().set(&doc_path, body.into_inner()).await?;
    let response = written(&doc_path, &change);
    emit(&dispatcher, doc_path, change);

    Ok(HttpResponse::Created().json(response))
}

/// Create or replace a document
/// PUT /v1/documents/{path}
pub async fn put_document(
    functions: web::Data<Functions>,
    dispatcher: web::Data<TriggerDispatcher>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    let doc_path = DocPath::parse(&path)?;
    let change = functions.store().set(&doc_path, body.into_inner()).await?;
    let response = written(&doc_path, &change);
    emit(&dispatcher, doc_path, change);

    Ok(HttpResponse::Ok().json(response))
}

/// Merge fields into an existing document
/// PATCH /v1/documents/{path}
pub async fn update_document(
    functions: web::Data<Functions>,
    dispatcher: web::Data<TriggerDispatcher>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    let doc_path = DocPath::parse(&path)?;
    let Value::Object(fields) = body.into_inner() else {
        return Err(FunctionError::InvalidArgument(
            "Update body must be a JSON object".to_string(),
        ));
    };

    let change = functions.store().update(&doc_path, fields).await?;
    let response = written(&doc_path, &change);
    emit(&dispatcher, doc_path, change);

    Ok(HttpResponse::Ok().json(response))
}

/// DELETE /v1/documents/{path}
pub async fn delete_document(
    functions: web::Data<Functions>,
    dispatcher: web::Data<TriggerDispatcher>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let doc_path = DocPath::parse(&path)?;
    let change = functions.store().delete(&doc_path).await?;
    emit(&dispatcher, doc_path, change);

    Ok(HttpResponse::NoContent().finish())
}
