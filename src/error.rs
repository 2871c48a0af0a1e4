use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::repositories::StoreError;

/// The application's error type.
///
/// Every operation surfaces one of these kinds; the HTTP and socket layers map
/// the kind to a transport status.
#[derive(Error, Debug)]
pub enum AppError {
    /// A session, message, user or task is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Capacity exceeded, expired invite, malformed input, session unavailable.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Non-member search, non-author edit or delete.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Hash collision or duplicate membership.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or invalid credentials.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// A bounded retry loop gave up.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An unexpected store or collaborator failure.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::ResourceExhausted(_) => "resource_exhausted",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => AppError::Conflict(what),
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Internal(format!("Redis error: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(ref msg) => {
                tracing::debug!("Resource not found: {}", msg);
                (StatusCode::NOT_FOUND, msg.clone())
            }

            AppError::BadRequest(ref msg) => {
                tracing::debug!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, msg.clone())
            }

            AppError::Conflict(ref msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::Unauthorized(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::ResourceExhausted(ref msg) => {
                tracing::error!("Resource exhausted: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let kind = self.kind();
        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "kind": kind
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","kind":"internal"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
