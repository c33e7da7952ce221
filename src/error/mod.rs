//! Unified error handling for the HTTP services

use crate::queue::QueueError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Downstream error: {0}")]
    Downstream(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::Queue(e) if e.is_rejection() => {
                (StatusCode::BAD_REQUEST, "invalid_job", e.to_string())
            }
            AppError::Queue(e) => {
                tracing::error!("Queue error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "queue_error",
                    "A queue error occurred".to_string(),
                )
            }
            AppError::Downstream(e) => {
                tracing::error!("Downstream error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "downstream_error",
                    "Downstream service error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
