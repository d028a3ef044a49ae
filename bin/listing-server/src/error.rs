//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON `{"detail": ...}` body with an appropriate status code.
//!
//! Internal errors (Database, Internal) are logged with full detail but only
//! a generic message is returned, so SQL and file paths never reach clients.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the listing-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the sqlx store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request body failed schema validation.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The write collides with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An `If-Match` precondition did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// An extractor refused the request before the handler ran; keeps the
    /// extractor's status (400, 413, 415 or 422).
    #[error("rejected request: {1}")]
    Rejected(StatusCode, String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn listing_not_found() -> Self {
        ServerError::NotFound("Listing not found".into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, json!(m)),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!(m)),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, json!(m)),
            ServerError::PreconditionFailed(m) => (StatusCode::PRECONDITION_FAILED, json!(m)),
            ServerError::Rejected(status, m) => (status, json!(m)),
            ServerError::Validation(errs) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::to_value(&errs).unwrap_or_else(|_| json!(errs.to_string())),
            ),

            // Internal errors: log the full detail, return a generic message.
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!("internal server error"))
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, json!("internal server error"))
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Keep the full chain in the logs; clients only see a generic message.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ServerError {
                fn from(rejection: $rejection) -> Self {
                    ServerError::Rejected(rejection.status(), rejection.body_text())
                }
            }
        )+
    };
}

from_rejection!(JsonRejection, PathRejection, QueryRejection, MultipartRejection);
