/// HTTP handlers module
/// Provides the callable function endpoints and the document API

pub mod callable;
pub mod documents;

use actix_web::{HttpResponse, Result as ActixResult};
use serde_json::json;

pub use callable::{submit_rating, trigger_cleanup, Authenticator};
pub use documents::{create_document, delete_document, get_document, put_document, update_document};

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
