//! Error types for the polyrun server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Message returned for any failure that must not leak details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Listener or socket IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snippet store failure.
    #[error("Snippet store error: {0}")]
    Store(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "error": error })),
            )
                .into_response(),
            ServerError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": error })),
            )
                .into_response(),
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "success": false,
                        "error": INTERNAL_ERROR_MESSAGE,
                    })),
                )
                    .into_response()
            }
        }
    }
}
