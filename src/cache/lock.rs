//! Advisory lock files
//!
//! An exclusive lock per key gives true mutual exclusion between build
//! workers on one filesystem. The operating system releases the lock when
//! its holder exits, so a crashed producer never blocks the key for good.

use crate::error::{SsgCacheError, SsgCacheResult};
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::time::Instant;
use tracing::debug;

/// Held exclusive lock on a key; released on drop
///
/// The lock file itself is left in place: unlinking it would let the next
/// waiter lock a different inode than the one other waiters still hold open.
#[derive(Debug)]
pub struct KeyLock {
    file: File,
    path: PathBuf,
}

impl KeyLock {
    /// Acquire the lock, polling every `poll` until `ceiling` has elapsed
    pub async fn acquire(path: PathBuf, poll: Duration, ceiling: Duration) -> SsgCacheResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| SsgCacheError::io(format!("opening lock file {}", path.display()), e))?
            .into_std()
            .await;

        let started = Instant::now();
        let mut contended = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if contended {
                        debug!(
                            "Acquired {} after {}ms",
                            path.display(),
                            started.elapsed().as_millis()
                        );
                    }
                    return Ok(Self { file, path });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= ceiling {
                        return Err(SsgCacheError::LockTimeout {
                            path,
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    if !contended {
                        debug!("Waiting for lock {}", path.display());
                        contended = true;
                    }
                    tokio::time::sleep(poll.min(ceiling - waited)).await;
                }
                Err(e) => {
                    return Err(SsgCacheError::io(
                        format!("locking {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
