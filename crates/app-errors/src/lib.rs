//! Shared error type and HTTP response mapping for the batch workflow
//! platform. Every domain crate converts its own error enum into
//! [`AppError`] at its public boundary; nothing downstream of that boundary
//! needs to know about `sea_orm::DbErr` or other storage-specific types.

pub mod codes;

pub use codes::ErrorCode;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub status: u32,
    pub message: String,
}

/// The taxonomy described in the platform's error-handling design: most
/// variants map 1:1 onto a category (Config, StoreUnavailable, Protocol);
/// transient/terminal-task/cascading-account failures are recorded on the
/// task/batch rows directly by the task executor and never surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence adapter not initialized or unreachable. Mutating
    /// operations must reject immediately rather than retry internally.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Missing credential, unknown provider, or missing private key.
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream SSE or JSON payload could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::Validation,
            AppError::BadRequest(_) => ErrorCode::BadRequest,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            AppError::Config(_) => ErrorCode::Config,
            AppError::Protocol(_) => ErrorCode::Protocol,
            AppError::Database(_) => ErrorCode::Internal,
            AppError::Internal(_) => ErrorCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Database(e) => error!(error = %e, "database error"),
            AppError::StoreUnavailable(msg) => error!(%msg, "store unavailable"),
            AppError::Internal(msg) => error!(%msg, "internal error"),
            AppError::Config(msg) => warn!(%msg, "configuration error"),
            other => warn!(error = %other, "request rejected"),
        }

        let body = ErrorResponse {
            code: self.code().as_str(),
            status: status.as_u16() as u32,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
