//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ssg-cache - Build-time memoizing cache
///
/// Manages the build namespace shared by static-site build workers.
#[derive(Parser, Debug)]
#[command(name = "ssg-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SSG_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root directory (overrides config and environment detection)
    #[arg(long, global = true, env = "SSG_CACHE_DIR")]
    pub root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new build namespace
    Init,

    /// Show cache locations
    Path,

    /// Show the status of a key in the current build
    Status(StatusArgs),

    /// Remove cache data of previous builds
    Prune(PruneArgs),
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Key segments, store name first
    #[arg(required = true)]
    pub key: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the prune command
#[derive(Parser, Debug)]
pub struct PruneArgs {
    /// List what would be removed without deleting
    #[arg(long)]
    pub dry_run: bool,
}

/// Output format for status
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
