use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use plenum_breakout::BreakoutError;
use plenum_core::error::CoreError;
use plenum_recorder::RecorderError;
use plenum_sched::SchedError;
use plenum_store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain crates' errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `plenum_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A document-store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A recording-coordination error.
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// A breakout-orchestration error.
    #[error(transparent)]
    Breakout(#[from] BreakoutError),

    /// A scheduling error.
    #[error(transparent)]
    Sched(#[from] SchedError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Store(err) => classify_store_error(err),
            AppError::Recorder(err) => classify_recorder_error(err),
            AppError::Breakout(err) => match err {
                BreakoutError::Core(core) => classify_core_error(core),
                BreakoutError::Store(store) => classify_store_error(store),
                BreakoutError::Sched(SchedError::Store(store)) => classify_store_error(store),
            },
            AppError::Sched(SchedError::Store(store)) => classify_store_error(store),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Classify a store error into an HTTP status, error code, and message.
///
/// - Missing documents map to 404 with a sanitized message.
/// - Database and decode failures map to 500; document paths and driver
///   details stay in the logs.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        StoreError::Database(db_err) => {
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        StoreError::Decode { path, source } => {
            tracing::error!(path = %path, error = %source, "Malformed document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Classify a recording-coordination error.
///
/// Upstream recording-service failures map to 502/503 so callers can tell
/// "our fault" from "the recorder's fault"; store errors inside the
/// recorder delegate to the store classification.
fn classify_recorder_error(err: &RecorderError) -> (StatusCode, &'static str, String) {
    match err {
        RecorderError::Request(req_err) => {
            tracing::error!(error = %req_err, "Recording service unreachable");
            (
                StatusCode::BAD_GATEWAY,
                "RECORDING_UPSTREAM",
                "Recording service unreachable".to_string(),
            )
        }
        RecorderError::RateLimited { body } => {
            tracing::warn!(body = %body, "Recording service rate limited");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "RECORDING_RATE_LIMITED",
                "Recording service is rate limiting requests".to_string(),
            )
        }
        RecorderError::Api { status, body } => {
            tracing::error!(status, body = %body, "Recording service error");
            (
                StatusCode::BAD_GATEWAY,
                "RECORDING_UPSTREAM",
                "Recording service error".to_string(),
            )
        }
        RecorderError::Store(store) => classify_store_error(store),
    }
}
