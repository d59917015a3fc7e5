//! Build-time memoizing cache
//!
//! Values are keyed by a [`CacheKey`] and namespaced by the current
//! [`BuildId`], so parallel build workers sharing a filesystem reuse each
//! other's results while separate builds never do.
//!
//! # Key States
//!
//! | State | Record on disk | Description |
//! |-------|----------------|-------------|
//! | Absent | no `.stat` file | Never fetched, or last fetch failed |
//! | Pending | `.stat` = `pending` | A producer is running |
//! | Ready | `.stat` = `ready` + `.cache` | Entry written, may be expired |
//!
//! When the cache directory cannot be created the instance keeps the same
//! records in a process-wide [`MemoryStore`] instead.

pub mod build_id;
pub mod entry;
pub mod key;
pub mod lock;
pub mod retry;
pub mod ssg;
pub mod store;
pub mod waiter;

pub use build_id::{BuildId, ResolvedBuild};
pub use entry::{CacheEntry, CacheStatus, Clock, StoredEntry, SystemClock};
pub use key::{CacheKey, IntoCacheKey};
pub use lock::KeyLock;
pub use retry::RetryPolicy;
pub use ssg::{GetOptions, SsgCache};
pub use store::{
    DiskStorage, FlightGuard, MemoryStorage, MemoryStore, Record, StatusRevision, StorageBackend,
    StorageMode,
};
pub use waiter::{CoordinationWaiter, WaitStrategy};
