//! Path command - show cache locations

use crate::cache::build_id;
use crate::config::{CachePaths, Config};
use crate::error::SsgCacheResult;
use console::style;

/// Execute the path command
pub async fn execute(config: &Config) -> SsgCacheResult<()> {
    let paths = CachePaths::from_config(&config.cache);

    println!("{:<10} {}", "Root:", paths.root().display());
    println!("{:<10} {}", "Build ID:", paths.build_id_path().display());
    match build_id::current(&paths).await {
        Some(id) => println!("{:<10} {}", "Current:", paths.build_dir(id.as_str()).display()),
        None => println!(
            "{:<10} {}",
            "Current:",
            style("(not initialized, run: ssg-cache init)").dim()
        ),
    }
    Ok(())
}
