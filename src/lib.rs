//! ssg-cache - Build-time memoizing cache
//!
//! Memoizes expensive or remote fetches across repeated static-site builds
//! and across parallel build workers that share a filesystem.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;

pub use cache::{
    BuildId, CacheEntry, CacheKey, CacheStatus, CoordinationWaiter, GetOptions, IntoCacheKey,
    MemoryStore, RetryPolicy, SsgCache, StorageMode,
};
pub use error::{BoxError, SsgCacheError, SsgCacheResult};
