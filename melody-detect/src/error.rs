//! Error types for the melody-detect HTTP boundary

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::OrchestratorError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No provider can serve the request (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Request conflicts with the job's current state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// melody-common error
    #[error("Common error: {0}")]
    Common(#[from] melody_common::Error),
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::UnknownProvider(_) => ApiError::BadRequest(err.to_string()),
            OrchestratorError::NoProviders => ApiError::Unavailable(err.to_string()),
            OrchestratorError::NotFound(msg) => ApiError::NotFound(msg),
            OrchestratorError::Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("multipart body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "NO_PROVIDERS", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Common(melody_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_errors_map_to_status() {
        let cases = [
            (OrchestratorError::UnknownProvider("x".into()), StatusCode::BAD_REQUEST),
            (OrchestratorError::NoProviders, StatusCode::SERVICE_UNAVAILABLE),
            (OrchestratorError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::Conflict("FINISHED -> POLLING".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
