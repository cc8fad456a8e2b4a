use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use spool_core::domain::{BackendError, DispatchError, QueueError, StoreError, WaitError};

/// Error type for HTTP handlers.
///
/// Every variant renders as `{"error": <message>, "code": <CODE>}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

fn store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Unavailable(_) | StoreError::Conflict(_) => {
            tracing::error!(error = %err, "job store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Job store is unavailable".to_string(),
            )
        }
        other => internal(other),
    }
}

fn queue_error(err: &QueueError) -> (StatusCode, &'static str, String) {
    match err {
        QueueError::Unavailable(_) => {
            tracing::error!(error = %err, "job queue unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Job queue is unavailable".to_string(),
            )
        }
        other => internal(other),
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Dispatch(DispatchError::Wait(wait)) => match wait {
                WaitError::Timeout(waited) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    format!("No result within {}s", waited.as_secs_f64()),
                ),
                WaitError::JobTimedOut(msg) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    format!("Job timed out: {msg}"),
                ),
                WaitError::ExecutionFailed(msg) => (
                    StatusCode::BAD_GATEWAY,
                    "EXECUTION_FAILED",
                    format!("Job failed: {msg}"),
                ),
                WaitError::Store(err) => store_error(err),
            },
            AppError::Dispatch(DispatchError::Store(err))
            | AppError::Backend(BackendError::Store(err)) => store_error(err),
            AppError::Dispatch(DispatchError::Queue(err))
            | AppError::Backend(BackendError::Queue(err)) => queue_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Internal(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
