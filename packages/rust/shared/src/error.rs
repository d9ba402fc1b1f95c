//! Error types for coenroll.
//!
//! Library crates use [`CoenrollError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all coenroll operations.
#[derive(Debug, thiserror::Error)]
pub enum CoenrollError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error talking to the registry or a download source.
    #[error("network error: {0}")]
    Network(String),

    /// JSON or CSV parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The registry answered, but not the way the operation requires.
    #[error("registry error during {operation}: {message}")]
    Registry {
        operation: &'static str,
        message: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input data failed a structural check.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// DNS resolver could not be constructed.
    #[error("dns error: {0}")]
    Dns(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CoenrollError>;

impl CoenrollError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a registry error for the named operation.
    pub fn registry(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Registry {
            operation,
            message: msg.into(),
        }
    }

    /// A mutating registry call returned something other than the expected status.
    pub fn unexpected_status(operation: &'static str, expected: u16, actual: u16) -> Self {
        Self::registry(
            operation,
            format!("expected HTTP {expected}, got HTTP {actual}"),
        )
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the input row itself was bad, as opposed to the
    /// registry or the environment failing.
    pub fn is_row_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
