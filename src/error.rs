/// Error types for the store, push delivery and function layers.
/// Function errors carry a client-visible kind and map onto the callable
/// wire protocol and HTTP status codes.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Push rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid push message: {0}")]
    InvalidMessage(String),
}

/// Client-visible error kinds of a function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Kebab-case code, as reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Status name used in the callable error envelope.
    pub fn status(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl FunctionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FunctionError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FunctionError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            FunctionError::NotFound(_) => ErrorKind::NotFound,
            FunctionError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for FunctionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => FunctionError::NotFound(format!("Document not found: {}", path)),
            StoreError::InvalidPath(_) | StoreError::InvalidField(_) | StoreError::InvalidDocument(_) => {
                FunctionError::InvalidArgument(err.to_string())
            }
            other => FunctionError::Internal(other.to_string()),
        }
    }
}

impl From<MessagingError> for FunctionError {
    fn from(err: MessagingError) -> Self {
        FunctionError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FunctionError>;

impl ResponseError for FunctionError {
    fn status_code(&self) -> StatusCode {
        self.kind().http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "status": self.kind().status(),
                "message": self.to_string(),
            }
        }))
    }
}
