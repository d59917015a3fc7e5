//! Error types for ssg-cache
//!
//! All modules use `SsgCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by caller-supplied producers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for ssg-cache operations
pub type SsgCacheResult<T> = Result<T, SsgCacheError>;

/// All errors that can occur in ssg-cache
#[derive(Error, Debug)]
pub enum SsgCacheError {
    // Identity errors
    #[error("Unable to obtain a build ID: {0}")]
    Identity(String),

    // Key errors
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    // Coordination errors
    #[error("Timed out after {waited_ms}ms waiting for {key} to resolve")]
    Timeout { key: String, waited_ms: u64 },

    #[error("Timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    // Producer errors
    #[error("Producer failed for {key}: {source}")]
    Producer {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Giving up on {key} after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Box<SsgCacheError>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl SsgCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a producer error for a key
    pub fn producer(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Producer {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Check if error is worth another attempt of the whole `get` sequence
    ///
    /// Timeouts already spent the full wait budget, so repeating them would
    /// only multiply it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Json(_) | Self::Producer { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } => Some(
                "A previous producer may have crashed. Repopulate the key with skip_cache, enable `cache.lock`, or run: ssg-cache init",
            ),
            Self::LockTimeout { .. } => Some("Another build worker is holding the key; raise `cache.max_wait_ms`"),
            Self::ConfigInvalid { .. } => Some("Check ssg-cache.toml against the documented keys"),
            _ => None,
        }
    }
}
