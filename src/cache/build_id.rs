//! Build identity
//!
//! Every cache record lives under a per-build namespace so successive or
//! concurrent builds never read each other's data. `init` starts a new build;
//! every cache instance created afterwards resolves the same ID from disk.

use crate::cache::store::{temp_sibling, write_atomic};
use crate::config::CachePaths;
use crate::error::{SsgCacheError, SsgCacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Re-reads of an empty build ID file before it is treated as corrupt
const SETTLE_ATTEMPTS: u32 = 10;
const SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Unique identifier of one build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    /// Generate a fresh ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a persisted ID
    ///
    /// The ID becomes a directory name, so it must be a single path component.
    pub fn parse(raw: &str) -> SsgCacheResult<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(SsgCacheError::Identity("empty build ID".to_string()));
        }
        if id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(SsgCacheError::Identity(format!(
                "build ID {id:?} is not a single path component"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of resolving the build ID for a cache instance
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    pub id: BuildId,
    /// Whether the ID is persisted where other instances can read it
    pub shared: bool,
}

/// Start a new build: ensure the cache root exists and persist a fresh ID
///
/// Run once per build, before any cache instance is constructed.
pub async fn init(paths: &CachePaths) -> SsgCacheResult<BuildId> {
    fs::create_dir_all(paths.root()).await.map_err(|e| {
        SsgCacheError::io(format!("creating cache root {}", paths.root().display()), e)
    })?;

    let id = BuildId::generate();
    let path = paths.build_id_path();
    write_atomic(&path, id.as_str().as_bytes())
        .await
        .map_err(|e| SsgCacheError::io(format!("writing build ID {}", path.display()), e))?;

    info!("Initialized build {}", id);
    Ok(id)
}

/// Load the persisted build ID, or create one
///
/// When the ID cannot be persisted the instance keeps its generated ID for
/// itself and `shared` is false.
pub async fn resolve(paths: &CachePaths) -> ResolvedBuild {
    let path = paths.build_id_path();
    let id = BuildId::generate();

    let persisted = match settle(paths).await {
        Persisted::Found(existing) => {
            return ResolvedBuild {
                id: existing,
                shared: true,
            }
        }
        Persisted::Empty | Persisted::Unusable => {
            write_atomic(&path, id.as_str().as_bytes()).await
        }
        Persisted::Missing => persist_new(paths, &id).await,
    };

    match persisted {
        Ok(()) => {
            debug!("Created build ID {} at {}", id, path.display());
            ResolvedBuild { id, shared: true }
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // Another instance won the race; adopt its ID
            match settle(paths).await {
                Persisted::Found(winner) => ResolvedBuild {
                    id: winner,
                    shared: true,
                },
                _ => ResolvedBuild { id, shared: false },
            }
        }
        Err(e) => {
            debug!("Unable to write build ID {}: {}", path.display(), e);
            ResolvedBuild { id, shared: false }
        }
    }
}

/// Read the current build ID without creating one
pub async fn current(paths: &CachePaths) -> Option<BuildId> {
    match read_persisted(paths).await {
        Persisted::Found(id) => Some(id),
        _ => None,
    }
}

enum Persisted {
    Found(BuildId),
    Empty,
    Unusable,
    Missing,
}

async fn read_persisted(paths: &CachePaths) -> Persisted {
    let path = paths.build_id_path();
    match fs::read_to_string(&path).await {
        Ok(content) if content.trim().is_empty() => Persisted::Empty,
        Ok(content) => match BuildId::parse(&content) {
            Ok(id) => Persisted::Found(id),
            Err(e) => {
                warn!("Unusable build ID in {}: {}", path.display(), e);
                Persisted::Unusable
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Persisted::Missing,
        Err(e) => {
            debug!("Unable to read build ID {}: {}", path.display(), e);
            Persisted::Unusable
        }
    }
}

/// Read the persisted ID, giving a writer that just created the file time
/// to fill it
async fn settle(paths: &CachePaths) -> Persisted {
    let mut attempts = 0;
    loop {
        match read_persisted(paths).await {
            Persisted::Empty if attempts < SETTLE_ATTEMPTS => {
                attempts += 1;
                tokio::time::sleep(SETTLE_DELAY).await;
            }
            Persisted::Empty => {
                warn!(
                    "Build ID file {} stayed empty, replacing it",
                    paths.build_id_path().display()
                );
                return Persisted::Unusable;
            }
            other => return other,
        }
    }
}

/// Persist an ID only if none exists yet
///
/// The ID is staged in a temp file and hard-linked into place. Linking never
/// replaces an existing file, and the file never appears without its content.
async fn persist_new(paths: &CachePaths, id: &BuildId) -> io::Result<()> {
    fs::create_dir_all(paths.root()).await?;

    let path = paths.build_id_path();
    let tmp = temp_sibling(&path);
    let staged = stage(&tmp, id).await;
    let linked = match staged {
        Ok(()) => fs::hard_link(&tmp, &path).await,
        Err(e) => Err(e),
    };
    let _ = fs::remove_file(&tmp).await;
    linked
}

async fn stage(tmp: &Path, id: &BuildId) -> io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(id.as_str().as_bytes()).await?;
    file.sync_all().await
}
