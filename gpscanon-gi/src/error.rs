//! Error types for gpscanon-gi

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::workflow::StageError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Structural pipeline failure carrying its stage identifier
    #[error("{0}")]
    Stage(#[from] StageError),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., profile guard violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<gpscanon_common::Error> for ApiError {
    fn from(err: gpscanon_common::Error) -> Self {
        use gpscanon_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Convert(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // Pipeline failures keep their stage identifier in the payload
            ApiError::Stage(stage) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": {
                        "code": stage.code,
                        "step": stage.step,
                        "message": stage.message,
                    }
                }),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "error": { "code": "NOT_FOUND", "message": msg } }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": { "code": "BAD_REQUEST", "message": msg } }),
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                json!({ "error": { "code": "PROFILE_GUARD", "message": msg } }),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": { "code": "INTERNAL_ERROR", "message": msg } }),
            ),
            ApiError::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": { "code": "IO_ERROR", "message": err.to_string() } }),
            ),
            ApiError::Other(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": { "code": "INTERNAL_ERROR", "message": err.to_string() } }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
