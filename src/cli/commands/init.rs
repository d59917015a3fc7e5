//! Init command - start a new build namespace

use crate::cache::SsgCache;
use crate::config::{CachePaths, Config};
use crate::error::SsgCacheResult;
use console::style;

/// Execute the init command
pub async fn execute(config: &Config) -> SsgCacheResult<()> {
    let paths = CachePaths::from_config(&config.cache);
    let id = SsgCache::init(&paths).await?;

    println!("{} {}", style("Initialized build").green(), id);
    println!("  {}", paths.build_dir(id.as_str()).display());
    Ok(())
}
