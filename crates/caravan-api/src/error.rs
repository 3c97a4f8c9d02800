//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use caravan_core::error::EngineError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `EngineError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            EngineError::User(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            EngineError::Script(_) => (StatusCode::UNPROCESSABLE_ENTITY, "script_error"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::GameNotFound(_) => (StatusCode::NOT_FOUND, "game_not_found"),
            EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: EngineError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_user_error_maps_to_400() {
        assert_eq!(
            status_of(EngineError::user("Invalid scenario.")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_script_error_maps_to_422() {
        assert_eq!(
            status_of(EngineError::script("unknown step type")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_conflict_maps_to_409() {
        assert_eq!(
            status_of(EngineError::conflict("Game was not active.")),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_game_not_found_maps_to_404() {
        assert_eq!(
            status_of(EngineError::GameNotFound(42)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_storage_error_maps_to_500() {
        assert_eq!(
            status_of(EngineError::storage("db down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
