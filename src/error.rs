//! Error types for LinkUp
//!
//! Two layers:
//! - `AppError` is the internal error raised by the platform client,
//!   storage, and realtime code.
//! - `Failure` is what crosses the data-access boundary. Every service
//!   operation returns `Outcome<T>`, and `Envelope<T>` is its wire form
//!   (`{success, data}` / `{success, msg}`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Row or object does not exist
    #[error("Resource not found")]
    NotFound,

    /// Missing or rejected credentials
    #[error("Authentication required")]
    Unauthorized,

    /// Client-side validation failed before any request was issued
    #[error("{0}")]
    Validation(String),

    /// The platform answered with an error body
    #[error("Backend error: {0}")]
    Backend(String),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Realtime socket or channel error
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Realtime(err.to_string())
    }
}

impl AppError {
    /// Short label used for the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Validation(_) => "validation",
            AppError::Backend(_) => "backend",
            AppError::Storage(_) => "storage",
            AppError::HttpClient(_) => "http_client",
            AppError::Realtime(_) => "realtime",
            AppError::Serialization(_) => "serialization",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// =============================================================================
// Service boundary
// =============================================================================

/// A failed data-access operation, reduced to a user-facing reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub msg: String,
}

impl Failure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    /// Convert an internal error into a failure carrying `generic`.
    ///
    /// Validation errors keep their own message since they were written
    /// for the user. Everything else is logged and replaced.
    pub fn from_error(operation: &'static str, generic: &str, error: AppError) -> Self {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error.kind(), operation])
            .inc();

        match error {
            AppError::Validation(msg) => Self { msg },
            other => {
                tracing::warn!(operation, error = %other, "Data access failed");
                Self::new(generic)
            }
        }
    }

    /// Like `from_error`, but surfaces the platform's own message
    /// (used where the screens show the backend text verbatim).
    pub fn passthrough(operation: &'static str, error: AppError) -> Self {
        let msg = match &error {
            AppError::Backend(msg) | AppError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self::from_error(operation, &msg, error)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for Failure {}

/// Result of a data-access operation
pub type Outcome<T> = std::result::Result<T, Failure>;

/// Wire form of an `Outcome`
///
/// `{"success": true, "data": ...}` or `{"success": false, "msg": "..."}`.
/// `data` is omitted for operations without a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            msg: None,
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            msg: Some(msg.into()),
        }
    }

    /// Back to an `Outcome`. A failed envelope without a message gets an
    /// empty reason.
    pub fn into_outcome(self) -> Outcome<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(Failure::new(self.msg.unwrap_or_default()))
        }
    }
}

impl<T> From<Outcome<T>> for Envelope<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(data) => Envelope::ok(data),
            Err(failure) => Envelope::failed(failure.msg),
        }
    }
}

impl From<Outcome<()>> for Envelope<serde_json::Value> {
    fn from(outcome: Outcome<()>) -> Self {
        match outcome {
            Ok(()) => Envelope {
                success: true,
                data: None,
                msg: None,
            },
            Err(failure) => Envelope::failed(failure.msg),
        }
    }
}
