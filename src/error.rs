//! Error types for the tfbridge crate.

use thiserror::Error;

use crate::interop::ForeignError;

/// Top-level error type for tfbridge operations.
#[derive(Error, Debug, Clone)]
pub enum BindError {
    /// The foreign module could not be resolved. Carries the full
    /// user-facing diagnostic built by [`crate::report::error_message`].
    #[error("{0}")]
    ModuleNotFound(String),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Foreign call failed: {0}")]
    Foreign(#[from] ForeignError),

    #[error("Suppression token mismatch: expected {expected}, got {got}")]
    TokenMismatch { expected: String, got: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for BindError {
    fn from(err: serde_json::Error) -> Self {
        BindError::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BindError>;
