use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::queue::backend::QueueBackendError;
use crate::transport::store::TransportStoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueBackendError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportStoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn shielded(log_msg: String, client_fallback: &str) -> (String, String) {
    let client_msg = if is_production() {
        client_fallback.to_string()
    } else {
        log_msg.clone()
    };
    (client_msg, log_msg)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let (client, log) = shielded(e.to_string(), "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client, log)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Queue(e) => match e {
                QueueBackendError::UnknownQueue(name) => (
                    StatusCode::NOT_FOUND,
                    "UNKNOWN_QUEUE",
                    format!("No queue named [{name}] is configured"),
                    e.to_string(),
                ),
                _ => {
                    let (client, log) = shielded(e.to_string(), "Queue backend unavailable");
                    (StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_ERROR", client, log)
                }
            },
            AppError::Transport(e) => match e {
                TransportStoreError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "TRANSPORT_NOT_FOUND",
                    format!("The provided transport id [{id}] is not available"),
                    e.to_string(),
                ),
                TransportStoreError::AlreadyTerminal { .. } => (
                    StatusCode::CONFLICT,
                    "TRANSPORT_STEP_TERMINAL",
                    e.to_string(),
                    e.to_string(),
                ),
                TransportStoreError::IllegalTransition { .. } => (
                    StatusCode::CONFLICT,
                    "ILLEGAL_TRANSITION",
                    e.to_string(),
                    e.to_string(),
                ),
                TransportStoreError::NotPending { .. } => (
                    StatusCode::CONFLICT,
                    "NOT_PENDING",
                    e.to_string(),
                    e.to_string(),
                ),
                TransportStoreError::ContentUnavailable(id) => (
                    StatusCode::CONFLICT,
                    "CONTENT_UNAVAILABLE",
                    format!("The message with transport id [{id}] is not readable anymore"),
                    e.to_string(),
                ),
                _ => {
                    let (client, log) = shielded(e.to_string(), "Transport store unavailable");
                    (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR", client, log)
                }
            },
            AppError::Internal(e) => {
                let (client, log) = shielded(e.clone(), "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client, log)
            }
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
