//! Cache entries, per-key status and the clock used for expiry

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A cached value with an optional absolute expiry (epoch milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Entry as held by a storage backend, before decoding into the caller's type
pub type StoredEntry = CacheEntry<serde_json::Value>;

impl<T> CacheEntry<T> {
    /// Create an entry, expiring `ttl` after `now` when a ttl is given
    pub fn new(data: T, ttl: Option<Duration>, now: i64) -> Self {
        let exp = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now.saturating_add(ttl_ms)
        });
        Self { data, exp }
    }

    /// Whether the entry may be served to a reader
    ///
    /// Readers that did not ask for a ttl accept any entry, as do entries
    /// written without one.
    pub fn is_fresh(&self, reader_has_ttl: bool, now: i64) -> bool {
        match self.exp {
            Some(exp) if reader_has_ttl => now < exp,
            _ => true,
        }
    }
}

/// Per-key coordination status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Never observed, or reset after a failed fetch
    #[default]
    Absent,
    /// A producer is running and no valid data exists yet
    Pending,
    /// An entry has been written (it may still be expired)
    Ready,
}

impl CacheStatus {
    /// Parse a status token; anything unrecognised reads as absent
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "pending" => Self::Pending,
            "ready" => Self::Ready,
            _ => Self::Absent,
        }
    }

    /// Token stored in the status record; `None` means no record at all
    pub fn as_token(&self) -> Option<&'static str> {
        match self {
            Self::Absent => None,
            Self::Pending => Some("pending"),
            Self::Ready => Some("ready"),
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Wall clock in epoch milliseconds
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
