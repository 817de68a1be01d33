use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store could not complete the call.
    #[error("Store error: {0}")]
    Store(String),

    /// A store call exceeded its time budget.
    #[error("Store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A malformed or incomplete request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unknown session or requirement.
    #[error("Resource not found")]
    NotFound,

    /// A record with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The usage meter failed.
    #[error("Usage metering failed: {0}")]
    Usage(String),

    /// Traffic enablement failed.
    #[error("Traffic enablement failed: {0}")]
    Traffic(String),

    /// Session creation failed and was rolled back.
    #[error("Session creation failed: {0}")]
    SessionInit(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // The CAPPORT API reports every failure as a 500 with an `error` message.
        let message = match self {
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "store unavailable".to_string()
            }

            AppError::Store(ref msg) => {
                tracing::error!("Store error: {}", msg);
                "store unavailable".to_string()
            }

            AppError::Timeout(ref d) => {
                tracing::error!("Store call timed out after {:?}", d);
                "store unavailable".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::NotFound => {
                tracing::debug!("Session not found");
                "invalid session".to_string()
            }

            AppError::Conflict(ref msg) => {
                tracing::warn!("Conflict: {}", msg);
                msg.clone()
            }

            AppError::Usage(ref msg) => {
                tracing::error!("Usage metering failed: {}", msg);
                "usage unavailable".to_string()
            }

            AppError::Traffic(ref msg) => {
                tracing::error!("Traffic enablement failed: {}", msg);
                "traffic enablement failed".to_string()
            }

            AppError::SessionInit(ref msg) => {
                tracing::error!("Session creation failed: {}", msg);
                "could not initiate session".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
