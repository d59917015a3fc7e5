//! Configuration management for ssg-cache

pub mod schema;

pub use schema::{CacheConfig, Config, GeneralConfig, RetryConfig};

use crate::error::{SsgCacheError, SsgCacheResult};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "ssg-cache.toml";

/// Environment variable overriding the cache root
pub const ROOT_ENV: &str = "SSG_CACHE_DIR";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub async fn load(&self) -> SsgCacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> SsgCacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SsgCacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| SsgCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted cache layout
///
/// ```text
/// <root>/BUILD_ID
/// <root>/cache/<build-id>/<joined-key>.cache
/// <root>/cache/<build-id>/<joined-key>.stat
/// <root>/cache/<build-id>/<joined-key>.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root from config, falling back to environment detection
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.root {
            Some(ref root) => Self::new(root.clone()),
            None => Self::detect(),
        }
    }

    /// Detect the cache root for the current environment
    ///
    /// `SSG_CACHE_DIR` wins. Vercel builds only allow writes under `/tmp`.
    /// Everywhere else the cache lives next to the project's dependencies.
    pub fn detect() -> Self {
        if let Some(dir) = env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            return Self::new(dir);
        }

        if env::var("VERCEL").as_deref() == Ok("1") {
            return Self::new("/tmp/.ssg-cache");
        }

        match env::current_dir() {
            Ok(cwd) => Self::new(cwd.join("node_modules").join(".cache").join("ssg-cache")),
            Err(e) => {
                debug!("Unable to read current directory ({}), using user cache dir", e);
                Self::new(
                    dirs::cache_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("ssg-cache"),
                )
            }
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the current build ID
    pub fn build_id_path(&self) -> PathBuf {
        self.root.join("BUILD_ID")
    }

    /// Directory containing one namespace per build
    pub fn builds_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Namespace directory for a single build
    pub fn build_dir(&self, build_id: &str) -> PathBuf {
        self.builds_dir().join(build_id)
    }
}
