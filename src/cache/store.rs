//! Storage backends
//!
//! Two interchangeable backends keep the data entry and the status of each key
//! as separate records, so a status can be checked without decoding a large
//! payload:
//!
//! - [`DiskStorage`] writes files under the build directory and is shared by
//!   every process on the same filesystem.
//! - [`MemoryStorage`] keeps the same records in a [`MemoryStore`], shared by
//!   every instance in the process that holds it.

use crate::cache::entry::{CacheStatus, StoredEntry};
use crate::cache::key::CacheKey;
use crate::error::{SsgCacheError, SsgCacheResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

/// Where an instance keeps its records; fixed for the instance's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Persistent,
    InMemory,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Kinds of record kept per key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Entry,
    Status,
    Lock,
}

impl Record {
    fn extension(&self) -> &'static str {
        match self {
            Self::Entry => "cache",
            Self::Status => "stat",
            Self::Lock => "lock",
        }
    }
}

/// Resolve the address of a key's record inside a build directory
pub fn record_path(dir: &Path, key: &CacheKey, record: Record) -> PathBuf {
    dir.join(format!("{}.{}", key.joined(), record.extension()))
}

/// Change marker of a status record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRevision {
    modified: Option<SystemTime>,
    len: u64,
}

/// Key to record persistence
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn mode(&self) -> StorageMode;

    /// Resolved address of a record
    fn address(&self, key: &CacheKey, record: Record) -> PathBuf;

    async fn write_entry(&self, key: &CacheKey, entry: &StoredEntry) -> SsgCacheResult<()>;

    async fn read_entry(&self, key: &CacheKey) -> SsgCacheResult<Option<StoredEntry>>;

    /// Writing [`CacheStatus::Absent`] removes the status record
    async fn write_status(&self, key: &CacheKey, status: CacheStatus) -> SsgCacheResult<()>;

    async fn read_status(&self, key: &CacheKey) -> SsgCacheResult<CacheStatus>;

    /// Cheap marker that changes whenever the status record is rewritten
    ///
    /// Backends without change observation return `None`.
    async fn status_revision(&self, _key: &CacheKey) -> SsgCacheResult<Option<StatusRevision>> {
        Ok(None)
    }
}

/// Write a file via a sibling temp file and rename, so readers never see a
/// partial record
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);

    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Unique hidden sibling of `path` for staging a write
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()))
}

/// File-backed storage under one build directory
#[derive(Debug, Clone)]
pub struct DiskStorage {
    dir: PathBuf,
}

impl DiskStorage {
    /// Open the build directory, creating it if needed
    pub async fn open(dir: PathBuf) -> SsgCacheResult<Self> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SsgCacheError::io(format!("creating cache directory {}", dir.display()), e))?;
        Ok(Self { dir })
    }

    /// Storage over a build directory that may not exist; nothing is created
    /// until a record is written
    pub fn existing(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StorageBackend for DiskStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Persistent
    }

    fn address(&self, key: &CacheKey, record: Record) -> PathBuf {
        record_path(&self.dir, key, record)
    }

    async fn write_entry(&self, key: &CacheKey, entry: &StoredEntry) -> SsgCacheResult<()> {
        let path = self.address(key, Record::Entry);
        let content = serde_json::to_vec(entry)?;
        write_atomic(&path, &content)
            .await
            .map_err(|e| SsgCacheError::io(format!("writing cache entry {}", path.display()), e))
    }

    async fn read_entry(&self, key: &CacheKey) -> SsgCacheResult<Option<StoredEntry>> {
        let path = self.address(key, Record::Entry);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SsgCacheError::io(
                    format!("reading cache entry {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_slice(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn write_status(&self, key: &CacheKey, status: CacheStatus) -> SsgCacheResult<()> {
        let path = self.address(key, Record::Status);
        let result = match status.as_token() {
            Some(token) => write_atomic(&path, token.as_bytes()).await,
            None => match fs::remove_file(&path).await {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|e| SsgCacheError::io(format!("writing status {}", path.display()), e))
    }

    async fn read_status(&self, key: &CacheKey) -> SsgCacheResult<CacheStatus> {
        let path = self.address(key, Record::Status);
        match fs::read_to_string(&path).await {
            Ok(token) => Ok(CacheStatus::from_token(&token)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CacheStatus::Absent),
            Err(e) => Err(SsgCacheError::io(
                format!("reading status {}", path.display()),
                e,
            )),
        }
    }

    async fn status_revision(&self, key: &CacheKey) -> SsgCacheResult<Option<StatusRevision>> {
        let path = self.address(key, Record::Status);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(StatusRevision {
                modified: meta.modified().ok(),
                len: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SsgCacheError::io(
                format!("observing status {}", path.display()),
                e,
            )),
        }
    }
}

/// Process-local records, keyed by resolved address
///
/// Also holds the per-address flight guards that serialize the
/// check-then-mark-pending step of concurrent `get` calls in one process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PathBuf, StoredEntry>>,
    statuses: Mutex<HashMap<PathBuf, CacheStatus>>,
    flights: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by every instance in this process that was not given
    /// its own
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<MemoryStore>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Enter the flight for an address, waiting while another caller is in it
    ///
    /// The guard drops its map slot on release once nobody else holds or
    /// awaits the flight.
    pub async fn enter(&self, address: &Path) -> FlightGuard<'_> {
        let flight = lock(&self.flights)
            .entry(address.to_path_buf())
            .or_default()
            .clone();
        let guard = flight.lock_owned().await;

        FlightGuard {
            store: self,
            address: address.to_path_buf(),
            guard: Some(guard),
        }
    }

    /// Number of addresses with a live flight
    pub fn flights(&self) -> usize {
        lock(&self.flights).len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one address's flight
#[derive(Debug)]
pub struct FlightGuard<'a> {
    store: &'a MemoryStore,
    address: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut flights = lock(&self.store.flights);
        if flights
            .get(&self.address)
            .is_some_and(|flight| Arc::strong_count(flight) == 1)
        {
            flights.remove(&self.address);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Storage kept in a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    dir: PathBuf,
    store: Arc<MemoryStore>,
}

impl MemoryStorage {
    /// `dir` only namespaces addresses; nothing is written there
    pub fn new(dir: PathBuf, store: Arc<MemoryStore>) -> Self {
        Self { dir, store }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::InMemory
    }

    fn address(&self, key: &CacheKey, record: Record) -> PathBuf {
        record_path(&self.dir, key, record)
    }

    async fn write_entry(&self, key: &CacheKey, entry: &StoredEntry) -> SsgCacheResult<()> {
        let address = self.address(key, Record::Entry);
        lock(&self.store.entries).insert(address, entry.clone());
        Ok(())
    }

    async fn read_entry(&self, key: &CacheKey) -> SsgCacheResult<Option<StoredEntry>> {
        let address = self.address(key, Record::Entry);
        Ok(lock(&self.store.entries).get(&address).cloned())
    }

    async fn write_status(&self, key: &CacheKey, status: CacheStatus) -> SsgCacheResult<()> {
        let address = self.address(key, Record::Status);
        let mut statuses = lock(&self.store.statuses);
        match status {
            CacheStatus::Absent => statuses.remove(&address),
            other => statuses.insert(address, other),
        };
        Ok(())
    }

    async fn read_status(&self, key: &CacheKey) -> SsgCacheResult<CacheStatus> {
        let address = self.address(key, Record::Status);
        Ok(lock(&self.store.statuses)
            .get(&address)
            .copied()
            .unwrap_or_default())
    }
}
