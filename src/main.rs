//! ssg-cache - Build-time memoizing cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use ssg_cache::cli::{Cli, Commands};
use ssg_cache::config::ConfigManager;
use ssg_cache::error::SsgCacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SsgCacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("ssg_cache=warn"),
        1 => EnvFilter::new("ssg_cache=info"),
        _ => EnvFilter::new("ssg_cache=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Configuration path: {}", config_manager.path().display());

    if let Some(root) = cli.root {
        config.cache.root = Some(root);
    }

    match cli.command {
        Commands::Init => ssg_cache::cli::commands::init(&config).await,
        Commands::Path => ssg_cache::cli::commands::path(&config).await,
        Commands::Status(args) => ssg_cache::cli::commands::status(args, &config).await,
        Commands::Prune(args) => ssg_cache::cli::commands::prune(args, &config).await,
    }
}
