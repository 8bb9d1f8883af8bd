//! Error types for the HTTP surface
//!
//! Every handler error renders as `{"error": {"code", "message"}}`.

use crate::cache::CacheError;
use crate::services::TriggerRejection;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Trigger refused by the orchestrator's entry guard (409)
    #[error("Identification rejected: {0}")]
    Rejected(#[from] TriggerRejection),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Common error: {0}")]
    Common(#[from] songid_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Rejected(rejection) => {
                let code = match rejection {
                    TriggerRejection::Disabled => "LISTENING_DISABLED",
                    TriggerRejection::InFlight => "IDENTIFICATION_IN_FLIGHT",
                    TriggerRejection::ShutDown => "SHUT_DOWN",
                };
                (StatusCode::CONFLICT, code, rejection.to_string())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Cache(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
