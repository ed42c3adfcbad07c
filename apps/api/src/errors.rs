use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::{ErrorKind, LlmError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Status and machine-readable code for a provider failure.
fn llm_status(err: &LlmError) -> (StatusCode, &'static str) {
    match err.kind() {
        ErrorKind::Authentication => (StatusCode::UNAUTHORIZED, "LLM_AUTHENTICATION_FAILED"),
        ErrorKind::UnsupportedProvider => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PROVIDER"),
        ErrorKind::RateLimit => (StatusCode::SERVICE_UNAVAILABLE, "LLM_RATE_LIMITED"),
        ErrorKind::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "LLM_TIMEOUT"),
        ErrorKind::Unavailable | ErrorKind::Network => {
            (StatusCode::SERVICE_UNAVAILABLE, "LLM_UNAVAILABLE")
        }
        ErrorKind::UnparseableResponse
        | ErrorKind::SchemaValidation
        | ErrorKind::MalformedResponse
        | ErrorKind::Api => (StatusCode::BAD_GATEWAY, "LLM_BAD_RESPONSE"),
        ErrorKind::Configuration => (StatusCode::INTERNAL_SERVER_ERROR, "LLM_CONFIGURATION"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(e) => {
                let (status, code) = llm_status(e);
                if status.is_server_error() {
                    tracing::error!(kind = ?e.kind(), "LLM error: {e}");
                } else {
                    tracing::warn!(kind = ?e.kind(), "LLM error: {e}");
                }
                let message = match e.kind() {
                    ErrorKind::Configuration => "The AI provider is misconfigured".to_string(),
                    _ => e.to_string(),
                };
                (status, code, message)
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
