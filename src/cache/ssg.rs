//! Cache facade
//!
//! `get` runs the per-key state machine:
//!
//! | Status  | Action |
//! |---------|--------|
//! | absent  | mark pending, produce, write entry, mark ready |
//! | pending | wait for the producer (this or another process) to finish |
//! | ready   | serve the entry if fresh, otherwise refetch as if absent |
//!
//! Any failure restarts the whole sequence under the retry policy. A status
//! left `pending` by the failed attempt is reset first, so the retry does not
//! wait on itself.
//!
//! A producer that dies without finishing leaves its key `pending`. With
//! `cache.lock` enabled the next caller reclaims it. Without the lock layer
//! every later `get` of that key fails with a timeout until the key is
//! repopulated with [`GetOptions::skipping_cache`] or the next build starts.

use crate::cache::build_id::{self, BuildId};
use crate::cache::entry::{CacheEntry, CacheStatus, Clock, StoredEntry, SystemClock};
use crate::cache::key::{CacheKey, IntoCacheKey};
use crate::cache::retry::RetryPolicy;
use crate::cache::store::{
    DiskStorage, MemoryStorage, MemoryStore, Record, StorageBackend, StorageMode,
};
use crate::cache::waiter::CoordinationWaiter;
use crate::config::{CachePaths, Config};
use crate::error::{BoxError, SsgCacheError, SsgCacheResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call options for [`SsgCache::get`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Always run the producer and overwrite whatever is cached
    ///
    /// Also the way to repopulate a key left `pending` by a crashed producer
    /// when locking is off.
    pub skip_cache: bool,

    /// Expire the written entry after this long; readers passing a ttl
    /// refetch expired entries
    pub ttl: Option<Duration>,
}

impl GetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn skipping_cache() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }
}

/// Build-scoped memoizing cache
#[derive(Debug)]
pub struct SsgCache {
    id: BuildId,
    paths: CachePaths,
    storage: Box<dyn StorageBackend>,
    store: Arc<MemoryStore>,
    waiter: CoordinationWaiter,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl SsgCache {
    /// Start a new build namespace; see [`build_id::init`]
    pub async fn init(paths: &CachePaths) -> SsgCacheResult<BuildId> {
        build_id::init(paths).await
    }

    /// Create a cache for the current build, sharing the process-wide
    /// memory store
    pub async fn new(config: &Config) -> Self {
        Self::with_store(config, MemoryStore::global()).await
    }

    /// Create a cache whose memory fallback is `store`
    ///
    /// Storage mode is decided here, once: if the build ID cannot be shared
    /// or the build directory cannot be created the instance stays in memory
    /// for its whole life.
    pub async fn with_store(config: &Config, store: Arc<MemoryStore>) -> Self {
        let paths = CachePaths::from_config(&config.cache);
        let build = build_id::resolve(&paths).await;
        let dir = paths.build_dir(build.id.as_str());

        let storage: Box<dyn StorageBackend> = if build.shared {
            match DiskStorage::open(dir.clone()).await {
                Ok(disk) => Box::new(disk),
                Err(e) => {
                    warn!("Running in memory-only mode: {}", e);
                    Box::new(MemoryStorage::new(dir, store.clone()))
                }
            }
        } else {
            warn!(
                "Running in memory-only mode: build ID could not be persisted under {}",
                paths.root().display()
            );
            Box::new(MemoryStorage::new(dir, store.clone()))
        };

        let waiter = CoordinationWaiter::for_mode(storage.mode(), &config.cache);
        debug!(
            "Cache for build {} ready ({} storage, locking: {})",
            build.id,
            storage.mode(),
            waiter.is_locking()
        );

        Self {
            id: build.id,
            paths,
            storage,
            store,
            waiter,
            retry: RetryPolicy::from_config(&config.retry),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id(&self) -> &BuildId {
        &self.id
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    pub fn mode(&self) -> StorageMode {
        self.storage.mode()
    }

    pub fn is_persistent(&self) -> bool {
        self.mode() == StorageMode::Persistent
    }

    pub fn max_wait(&self) -> Duration {
        self.waiter.max_wait()
    }

    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.waiter.set_max_wait(max_wait);
    }

    /// Resolved address of a key's record
    pub fn address(&self, key: &CacheKey, record: Record) -> PathBuf {
        self.storage.address(key, record)
    }

    /// Current status of a key, without waiting
    pub async fn status(&self, key: impl IntoCacheKey) -> SsgCacheResult<CacheStatus> {
        self.storage.read_status(&key.into_cache_key()?).await
    }

    /// Raw stored entry of a key
    pub async fn entry(&self, key: impl IntoCacheKey) -> SsgCacheResult<Option<StoredEntry>> {
        self.storage.read_entry(&key.into_cache_key()?).await
    }

    /// Return the cached value for `key`, or produce, store and return it
    ///
    /// The producer runs at most once per population of a key within this
    /// process. Across processes that holds only with `cache.lock` enabled.
    pub async fn get<T, F, Fut, E>(
        &self,
        key: impl IntoCacheKey,
        producer: F,
        options: GetOptions,
    ) -> SsgCacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let key = key.into_cache_key()?;
        let label = key.to_string();
        let (key, producer, options) = (&key, &producer, &options);

        self.retry
            .run(&label, move || self.try_get(key, producer, options))
            .await
    }

    async fn try_get<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        producer: &F,
        options: &GetOptions,
    ) -> SsgCacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let storage = &*self.storage;

        if let Some(_lock) = self.waiter.lock(storage, key).await? {
            if !options.skip_cache {
                match storage.read_status(key).await? {
                    // Pending is only written under the lock, so its writer is gone
                    CacheStatus::Pending => {
                        warn!("Reclaiming {}: previous producer exited before finishing", key)
                    }
                    status => {
                        if let Some(data) = self.lookup(key, status, options).await? {
                            return Ok(data);
                        }
                    }
                }
            }
            storage.write_status(key, CacheStatus::Pending).await?;
            return self.fill(key, producer, options).await;
        }

        if !options.skip_cache {
            let _flight = self.store.enter(&storage.address(key, Record::Status)).await;

            let status = self.waiter.wait_for_resolution(storage, key).await?;
            if let Some(data) = self.lookup(key, status, options).await? {
                return Ok(data);
            }
            storage.write_status(key, CacheStatus::Pending).await?;
        } else {
            storage.write_status(key, CacheStatus::Pending).await?;
        }

        self.fill(key, producer, options).await
    }

    /// Decode a ready, fresh entry; anything else is a miss
    async fn lookup<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        status: CacheStatus,
        options: &GetOptions,
    ) -> SsgCacheResult<Option<T>> {
        if status != CacheStatus::Ready {
            return Ok(None);
        }

        let Some(entry) = self.storage.read_entry(key).await? else {
            warn!("{} is marked ready but has no entry, refetching", key);
            return Ok(None);
        };

        if !entry.is_fresh(options.ttl.is_some(), self.clock.now_millis()) {
            debug!("Cache expired: {}", key);
            return Ok(None);
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                debug!("Cache hit: {}", key);
                Ok(Some(data))
            }
            Err(e) => {
                warn!("Cached value for {} does not decode, refetching: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Produce and store, resetting the status if anything fails
    async fn fill<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        producer: &F,
        options: &GetOptions,
    ) -> SsgCacheResult<T>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        match self.produce(key, producer, options).await {
            Ok(data) => Ok(data),
            Err(err) => {
                if let Err(reset) = self.storage.write_status(key, CacheStatus::Absent).await {
                    warn!("Unable to reset status of {}: {}", key, reset);
                }
                Err(err)
            }
        }
    }

    async fn produce<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        producer: &F,
        options: &GetOptions,
    ) -> SsgCacheResult<T>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        debug!("Fetching: {}", key);
        let data = producer()
            .await
            .map_err(|e| SsgCacheError::producer(key.to_string(), e))?;

        let entry = CacheEntry::new(
            serde_json::to_value(&data)?,
            options.ttl,
            self.clock.now_millis(),
        );
        self.storage.write_entry(key, &entry).await?;
        // Ready only once the entry is in place
        self.storage.write_status(key, CacheStatus::Ready).await?;

        Ok(data)
    }
}
