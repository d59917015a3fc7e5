//! Cache keys
//!
//! A key is a non-empty, ordered list of segments. The first segment names the
//! logical store (`posts`, `authors`, ...), the rest identify the record.

use crate::error::{SsgCacheError, SsgCacheResult};
use std::fmt;

/// Separator used when flattening segments into a single file name
const SEPARATOR: char = '-';

/// Canonical cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    segments: Vec<String>,
}

impl CacheKey {
    /// Build a key from segments, rejecting an empty key or an empty store name
    pub fn new<I, S>(segments: I) -> SsgCacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();

        match segments.first() {
            None => Err(SsgCacheError::InvalidKey("key has no segments".to_string())),
            Some(store) if store.is_empty() => {
                Err(SsgCacheError::InvalidKey("store segment is empty".to_string()))
            }
            Some(_) => Ok(Self { segments }),
        }
    }

    /// The logical store name (first segment)
    pub fn store(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Flatten into a single path component
    ///
    /// Path separators inside segments become the join separator, so
    /// `["posts", "2024/hello"]` and `["posts", "2024", "hello"]` share a file.
    pub fn joined(&self) -> String {
        let mut joined = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                joined.push(SEPARATOR);
            }
            joined.extend(segment.chars().map(|c| match c {
                '/' | '\\' => SEPARATOR,
                other => other,
            }));
        }
        joined
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Conversion of the accepted key shapes into a [`CacheKey`]
pub trait IntoCacheKey {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey>;
}

impl IntoCacheKey for CacheKey {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        Ok(self)
    }
}

impl IntoCacheKey for &CacheKey {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        Ok(self.clone())
    }
}

impl IntoCacheKey for &str {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new([self])
    }
}

impl IntoCacheKey for String {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new([self])
    }
}

impl IntoCacheKey for &[&str] {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new(self.iter().copied())
    }
}

impl<const N: usize> IntoCacheKey for [&str; N] {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new(self)
    }
}

impl IntoCacheKey for Vec<&str> {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new(self)
    }
}

impl IntoCacheKey for Vec<String> {
    fn into_cache_key(self) -> SsgCacheResult<CacheKey> {
        CacheKey::new(self)
    }
}
