//! Status command - inspect a key in the current build

use crate::cache::{CacheKey, CacheStatus, DiskStorage, Record, StorageBackend};
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::config::{CachePaths, Config};
use crate::error::SsgCacheResult;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct KeyReport {
    key: String,
    build_id: String,
    status: CacheStatus,
    expires_at: Option<DateTime<Utc>>,
    path: String,
}

/// Execute the status command
///
/// Read-only: neither a build ID nor a build directory is created.
pub async fn execute(args: StatusArgs, config: &Config) -> SsgCacheResult<()> {
    let key = CacheKey::new(args.key)?;
    let paths = CachePaths::from_config(&config.cache);
    let current = super::current_build(&paths).await?;
    let storage = DiskStorage::existing(paths.build_dir(current.as_str()));

    let status = storage.read_status(&key).await?;
    let expires_at = match status {
        CacheStatus::Ready => storage
            .read_entry(&key)
            .await?
            .and_then(|entry| entry.exp)
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    };

    let report = KeyReport {
        key: key.to_string(),
        build_id: current.to_string(),
        status,
        expires_at,
        path: storage.address(&key, Record::Entry).display().to_string(),
    };

    match args.format {
        OutputFormat::Table => print_report_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_report_table(report: &KeyReport) {
    let status_display = match report.status {
        CacheStatus::Ready => style("ready").green().to_string(),
        CacheStatus::Pending => style("pending").yellow().to_string(),
        CacheStatus::Absent => style("absent").dim().to_string(),
    };
    let expires = match report.expires_at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    };

    println!("{:<10} {}", "Key:", report.key);
    println!("{:<10} {}", "Build:", report.build_id);
    println!("{:<10} {}", "Status:", status_display);
    if report.status == CacheStatus::Ready {
        println!("{:<10} {}", "Expires:", expires);
    }
    println!("{:<10} {}", "Entry:", report.path);
}
