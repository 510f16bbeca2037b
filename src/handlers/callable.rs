/// Callable function endpoints.
/// Requests carry `{"data": ...}`, successes answer `{"result": ...}` and
/// failures `{"error": {"status", "message"}}` via [`FunctionError`]'s
/// response mapping.
use crate::db::models::SubmitRatingRequest;
use crate::error::{FunctionError, Result};
use crate::functions::{CallContext, Functions};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Resolves `Authorization: Bearer` tokens to caller identities.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    tokens: HashMap<String, String>,
}

impl Authenticator {
    /// `tokens` maps bearer token to uid.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Authenticator { tokens }
    }

    /// No header means an anonymous call; a header with an unknown token
    /// is rejected outright.
    pub fn context(&self, req: &HttpRequest) -> Result<CallContext> {
        let Some(value) = req.headers().get(header::AUTHORIZATION) else {
            return Ok(CallContext::anonymous());
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| FunctionError::Unauthenticated("Malformed Authorization header".to_string()))?;

        self.tokens
            .get(token)
            .map(|uid| CallContext::authenticated(uid.clone()))
            .ok_or_else(|| FunctionError::Unauthenticated("Invalid auth token".to_string()))
    }
}

/// Strip the `data` envelope if present. Empty bodies read as null.
pub fn unwrap_data(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FunctionError::InvalidArgument(format!("Request body is not JSON: {}", e)))?;
    Ok(strip_envelope(value))
}

fn strip_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

fn result<T: Serialize>(value: &T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "result": value }))
}

/// POST /callable/submitRating
pub async fn submit_rating(functions: web::Data<Functions>, body: web::Bytes) -> Result<HttpResponse> {
    // Some clients nest the payload once more inside `data`
    let data = strip_envelope(unwrap_data(&body)?);
    let request: SubmitRatingRequest = match data {
        Value::Null => SubmitRatingRequest::default(),
        other => serde_json::from_value(other)
            .map_err(|e| FunctionError::InvalidArgument(format!("Malformed request: {}", e)))?,
    };

    let response = functions.submit_rating(request).await?;
    Ok(result(&response))
}

/// POST /callable/triggerCleanup
pub async fn trigger_cleanup(
    functions: web::Data<Functions>,
    auth: web::Data<Authenticator>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let ctx = auth.context(&req)?;
    unwrap_data(&body)?;

    let response = functions.trigger_cleanup(&ctx, Utc::now()).await?;
    Ok(result(&response))
}
