//! Waiting for in-flight producers
//!
//! A caller that finds a key `pending` blocks until the status changes. In
//! persistent mode the status file is observed for rewrites by any process;
//! in memory mode the status is simply polled. Both give up after the
//! maximum wait, so a producer that crashed mid-fetch cannot hold callers
//! forever.
//!
//! Without the lock layer, reading the status and marking it `pending` are
//! two steps. Two processes can both see `absent` and both produce; the
//! last write wins. With the lock layer the whole fetch runs under an
//! exclusive lock file and that window closes.

use crate::cache::entry::CacheStatus;
use crate::cache::key::CacheKey;
use crate::cache::lock::KeyLock;
use crate::cache::store::{Record, StatusRevision, StorageBackend, StorageMode};
use crate::config::CacheConfig;
use crate::error::{SsgCacheError, SsgCacheResult};
use std::time::Duration;
use tracing::debug;

/// How a pending status is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Re-read the status only when its record changed
    Watch { interval: Duration },
    /// Re-read the status at a fixed interval
    Poll { interval: Duration },
}

/// Blocks callers until a key leaves `pending`
#[derive(Debug, Clone)]
pub struct CoordinationWaiter {
    strategy: WaitStrategy,
    max_wait: Duration,
    lock_poll: Option<Duration>,
}

impl CoordinationWaiter {
    pub fn new(strategy: WaitStrategy, max_wait: Duration) -> Self {
        Self {
            strategy,
            max_wait,
            lock_poll: None,
        }
    }

    /// Pick the strategy matching a storage mode
    ///
    /// Lock files need a shared filesystem, so the lock layer is only
    /// enabled for persistent storage.
    pub fn for_mode(mode: StorageMode, config: &CacheConfig) -> Self {
        let strategy = match mode {
            StorageMode::Persistent => WaitStrategy::Watch {
                interval: config.watch_interval(),
            },
            StorageMode::InMemory => WaitStrategy::Poll {
                interval: config.poll_interval(),
            },
        };
        let mut waiter = Self::new(strategy, config.max_wait());
        if config.lock && mode == StorageMode::Persistent {
            waiter.lock_poll = Some(config.poll_interval());
        }
        waiter
    }

    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.max_wait = max_wait;
    }

    /// Whether this waiter holds the lock-file capability
    pub fn is_locking(&self) -> bool {
        self.lock_poll.is_some()
    }

    /// Take the key's lock file, or `None` when locking is not enabled
    pub async fn lock(
        &self,
        storage: &dyn StorageBackend,
        key: &CacheKey,
    ) -> SsgCacheResult<Option<KeyLock>> {
        match self.lock_poll {
            Some(poll) => {
                let path = storage.address(key, Record::Lock);
                KeyLock::acquire(path, poll, self.max_wait).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Return the key's status once it is no longer `pending`
    pub async fn wait_for_resolution(
        &self,
        storage: &dyn StorageBackend,
        key: &CacheKey,
    ) -> SsgCacheResult<CacheStatus> {
        // Taken before the status read so a rewrite in between is still seen
        let revision = match self.strategy {
            WaitStrategy::Watch { .. } => storage.status_revision(key).await?,
            WaitStrategy::Poll { .. } => None,
        };

        let status = storage.read_status(key).await?;
        if status != CacheStatus::Pending {
            return Ok(status);
        }

        debug!("Waiting for {} to resolve", key);
        let observed = match self.strategy {
            WaitStrategy::Watch { interval } => {
                tokio::time::timeout(self.max_wait, watch(storage, key, interval, revision)).await
            }
            WaitStrategy::Poll { interval } => {
                tokio::time::timeout(self.max_wait, poll(storage, key, interval)).await
            }
        };

        match observed {
            Ok(status) => status,
            Err(_) => Err(SsgCacheError::Timeout {
                key: key.to_string(),
                waited_ms: u64::try_from(self.max_wait.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

async fn watch(
    storage: &dyn StorageBackend,
    key: &CacheKey,
    interval: Duration,
    mut last: Option<StatusRevision>,
) -> SsgCacheResult<CacheStatus> {
    loop {
        tokio::time::sleep(interval).await;

        let current = storage.status_revision(key).await?;
        if current == last {
            continue;
        }
        last = current;

        let status = storage.read_status(key).await?;
        if status != CacheStatus::Pending {
            return Ok(status);
        }
    }
}

async fn poll(
    storage: &dyn StorageBackend,
    key: &CacheKey,
    interval: Duration,
) -> SsgCacheResult<CacheStatus> {
    loop {
        tokio::time::sleep(interval).await;

        let status = storage.read_status(key).await?;
        if status != CacheStatus::Pending {
            return Ok(status);
        }
    }
}
