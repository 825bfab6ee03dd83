use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Application-level error type. Variants carry string representations so
/// the type stays `Clone` across the layers that need it.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    // --- Request/input errors ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    // --- Database errors ---
    #[error("Database query error: {0}")]
    DatabaseQueryError(String),

    #[error("Database pool error: {0}")]
    DbPoolError(String),

    #[error("Database interaction error: {0}")]
    DbInteractError(String),

    // --- Generation backend errors ---
    // These never cross the HTTP boundary: the adapter converts them into
    // inline `Error:` text within the stream. They exist for logging and
    // for the adapter's internal plumbing.
    #[error("Generation backend error: {0}")]
    GenerationError(String),

    #[error("HTTP request error: {0}")]
    HttpRequestError(String),

    // --- General/internal errors ---
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl From<deadpool_diesel::PoolError> for AppError {
    fn from(err: deadpool_diesel::PoolError) -> Self {
        Self::DbPoolError(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for AppError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        Self::DbInteractError(err.to_string())
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        Self::DatabaseQueryError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpRequestError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::RateLimited { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Rate limit exceeded",
                        "retry_after_secs": retry_after_secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return response;
            }
            AppError::DatabaseQueryError(msg)
            | AppError::DbPoolError(msg)
            | AppError::DbInteractError(msg) => {
                error!("Database error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::GenerationError(msg) | AppError::HttpRequestError(msg) => {
                error!("Generation backend error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Generation backend error".to_string(),
                )
            }
            AppError::ConfigError(msg)
            | AppError::SerializationError(msg)
            | AppError::InternalServerError(msg) => {
                error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}
