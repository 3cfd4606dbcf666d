//! Error types for the date reconciliation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an upstream fact provider.
///
/// These never escape the resolution engine: every variant degrades the
/// waterfall to the next tier.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),

    #[error("Adapter {adapter} timed out after {after_ms}ms")]
    Timeout { adapter: &'static str, after_ms: u64 },

    #[error("Malformed adapter response: {0}")]
    Malformed(String),
}

/// Notification intake errors. A rejected notification is dropped, never enqueued.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Malformed notification: {0}")]
    Malformed(String),

    #[error("Coalescer is shutting down")]
    ShuttingDown,
}

/// Resolution cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Concurrent cache write for {0}")]
    WriteConflict(String),
}

/// Errors surfaced by the resolution engine.
///
/// An exhausted waterfall is not an error; it produces an unresolved decision.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to persist decision: {0}")]
    Cache(#[from] CacheError),
}

/// Top-level errors for bootstrap, configuration and the CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid media key: {0}")]
    InvalidKey(String),

    #[error("Resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Notification rejected: {0}")]
    Notification(#[from] NotificationError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
