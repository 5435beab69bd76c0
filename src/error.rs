use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid signature")]
    Signature,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    /// Storage or queue unavailable. Safe to retry.
    #[error("Transient infrastructure error: {0}")]
    TransientInfra(String),

    /// Business state that will never reconcile on retry.
    #[error("Permanent processing error: {0}")]
    PermanentProcessing(String),

    #[error("External service error: {0}")]
    External(String),
}

impl AppError {
    /// Whether a queue consumer should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientInfra(_) | AppError::External(_))
    }

    /// Stable machine-readable kind, used in logs and parked job records.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Signature => "signature",
            AppError::Config(_) => "config",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::TransientInfra(_) => "transient_infra",
            AppError::PermanentProcessing(_) => "permanent_processing",
            AppError::External(_) => "external",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::Signature => (StatusCode::BAD_REQUEST, "Invalid signature"),
            AppError::Config(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server misconfigured")
            }
            AppError::Conflict(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            AppError::TransientInfra(ref msg) => {
                tracing::error!("Transient infrastructure error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
            }
            AppError::PermanentProcessing(ref msg) => {
                tracing::error!("Permanent processing error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::External(ref msg) => {
                tracing::error!("External service error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                tracing::warn!(constraint = ?db.constraint(), "Unique constraint violated: {}", db.message());
                AppError::Conflict("Resource already exists".to_string())
            }
            _ => AppError::TransientInfra(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::TransientInfra(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
