//! Prune command - remove cache data of previous builds

use crate::cli::args::PruneArgs;
use crate::config::{CachePaths, Config};
use crate::error::{SsgCacheError, SsgCacheResult};
use console::style;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Execute the prune command
pub async fn execute(args: PruneArgs, config: &Config) -> SsgCacheResult<()> {
    let paths = CachePaths::from_config(&config.cache);
    let current = super::current_build(&paths).await?;

    let stale = stale_builds(&paths.builds_dir(), current.as_str()).await?;
    if stale.is_empty() {
        println!("No previous builds to remove.");
        return Ok(());
    }

    for dir in &stale {
        if args.dry_run {
            println!("{} {}", style("Would remove").yellow(), dir.display());
            continue;
        }

        fs::remove_dir_all(dir)
            .await
            .map_err(|e| SsgCacheError::io(format!("removing {}", dir.display()), e))?;
        info!("Removed build cache {}", dir.display());
        println!("{} {}", style("Removed").green(), dir.display());
    }

    if !args.dry_run {
        println!("Pruned {} build(s), kept {}", stale.len(), current);
    }
    Ok(())
}

/// Build directories that do not belong to `current`
async fn stale_builds(builds_dir: &Path, current: &str) -> SsgCacheResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(builds_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No builds directory at {}", builds_dir.display());
            return Ok(vec![]);
        }
        Err(e) => return Err(SsgCacheError::io("reading builds directory", e)),
    };

    let mut stale = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SsgCacheError::io("reading builds entry", e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir && entry.file_name() != current {
            stale.push(entry.path());
        }
    }

    stale.sort();
    Ok(stale)
}
