//! Error types for the log store
//!
//! Backends return [`StoreError`]; the [`crate::LogBook`] facade reports them
//! and turns them into zero values, so none of these ever reach the code
//! that emitted the log entry.

use thiserror::Error;

/// Errors produced by log store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// No backend is configured
    #[error("log store is not configured")]
    Unavailable,

    /// The backend was closed and accepts no further operations
    #[error("log store is closed")]
    Closed,

    /// SQL execution or query failed (after the one schema-repair retry)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading or writing a log file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend does not implement this operation
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// The tag cannot be used as part of a file or table name
    #[error("invalid tag name: {0:?}")]
    InvalidTag(String),

    /// The store configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True for conditions that mean "persistence is switched off" rather than a failure
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Closed)
    }
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
