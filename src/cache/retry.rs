//! Bounded retry with a fixed delay

use crate::config::RetryConfig;
use crate::error::{SsgCacheError, SsgCacheResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Re-runs a failed operation a bounded number of times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; zero is treated as one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out
    ///
    /// Exhaustion is reported as [`SsgCacheError::RetriesExhausted`] carrying
    /// the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> SsgCacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SsgCacheResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(SsgCacheError::RetriesExhausted {
                        key: label.to_string(),
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, label, err
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
