//! Configuration schema for ssg-cache
//!
//! Configuration is read from `ssg-cache.toml` in the build's working directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache coordination settings
    pub cache: CacheConfig,

    /// Retry settings for `get`
    pub retry: RetryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory (detected from the environment when unset)
    pub root: Option<PathBuf>,

    /// Maximum time to wait on a pending key or a held lock
    pub max_wait_ms: u64,

    /// How often the status file is checked for changes in persistent mode
    pub watch_interval_ms: u64,

    /// Status poll interval in memory mode, also used for lock polling
    pub poll_interval_ms: u64,

    /// Take an advisory lock file per key before producing
    pub lock: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_wait_ms: 60_000,
            watch_interval_ms: 250,
            poll_interval_ms: 100,
            lock: false,
        }
    }
}

impl CacheConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts of a `get` sequence, including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 100,
        }
    }
}
