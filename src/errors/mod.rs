//! Error handling for the team finder.
//!
//! `AppError` is the backend error, mapped to HTTP status codes and the JSON
//! error envelope. `StoreError` is the offline-first client taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Backend error type.
#[derive(Debug)]
pub enum AppError {
    /// Admin password missing or wrong
    Unauthorized(String),
    /// Ownership token does not match the stored record
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Database(msg)
            | AppError::Internal(msg)
            | AppError::BadRequest(msg) => msg,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self::new(error.error_code(), error.message())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Errors surfaced by the offline-first client layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport failure, non-success status, timeout or malformed body.
    /// Always absorbed by the local fallback.
    RemoteUnavailable {
        status: Option<u16>,
        message: String,
    },
    /// Target id is not in the local snapshot.
    RecordNotFound(String),
    /// Ownership token does not match the stored record.
    NotAuthorized(String),
    /// Update called on a record without an id.
    MissingIdentity,
    /// A durable write failed.
    Storage(String),
}

impl StoreError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        StoreError::RemoteUnavailable {
            status,
            message: message.into(),
        }
    }

    /// Terminal errors are surfaced to the caller and never retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StoreError::RemoteUnavailable { .. })
    }

    /// HTTP status behind a remote failure, if there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::RemoteUnavailable { status, .. } => *status,
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::RemoteUnavailable {
                status: Some(status),
                message,
            } => write!(f, "remote store unavailable ({}): {}", status, message),
            StoreError::RemoteUnavailable {
                status: None,
                message,
            } => write!(f, "remote store unavailable: {}", message),
            StoreError::RecordNotFound(id) => write!(f, "team request {} not found", id),
            StoreError::NotAuthorized(id) => {
                write!(f, "not authorized to modify team request {}", id)
            }
            StoreError::MissingIdentity => write!(f, "update requires a record id"),
            StoreError::Storage(msg) => write!(f, "local storage error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::remote(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("x".into()).error_code(),
            codes::VALIDATION_ERROR
        );
    }

    #[test]
    fn test_only_remote_failures_are_recoverable() {
        assert!(!StoreError::remote(Some(503), "down").is_terminal());
        assert!(StoreError::RecordNotFound("r1".into()).is_terminal());
        assert!(StoreError::NotAuthorized("r1".into()).is_terminal());
        assert!(StoreError::MissingIdentity.is_terminal());
        assert_eq!(StoreError::remote(Some(403), "no").status(), Some(403));
        assert_eq!(StoreError::MissingIdentity.status(), None);
    }
}
