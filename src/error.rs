//! Hugin error types

use std::path::PathBuf;
use std::time::Duration;

/// Hugin error types
#[derive(Debug, thiserror::Error)]
pub enum HuginError {
    // Remote model / network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("empty response from model")]
    EmptyResponse,

    // Cache errors. These never escape the cache layer; they are logged and
    // degrade to a miss (read) or a dropped write.
    #[error("cache lock {path:?} not acquired within {timeout:?}")]
    CacheLockTimeout { path: PathBuf, timeout: Duration },

    #[error("corrupt cache entry {path:?}: {reason}")]
    CacheEntryCorrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data error: {0}")]
    DataError(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown model type: {0}")]
    UnknownModelType(String),

    // Streaming errors
    #[error("event channel is closed")]
    ChannelClosed,

    #[error("pipeline error: {0}")]
    Pipeline(String),

    // Service errors
    #[error("invalid messages: {0}")]
    InvalidMessages(String),

    #[error("invalid model id: {0}")]
    InvalidModelId(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),
}

impl HuginError {
    /// Whether a remote call failing with this error may succeed on retry.
    ///
    /// Rate limits, network failures and 5xx responses are transient;
    /// everything else (auth, bad input, cache and stream errors) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginError::RateLimited | HuginError::Http(_) => true,
            HuginError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for Hugin operations
pub type Result<T> = std::result::Result<T, HuginError>;
