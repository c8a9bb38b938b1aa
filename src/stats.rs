//! Cache statistics and maintenance.
//!
//! `atlas cache stats` gives a quick health overview of the analysis cache;
//! `atlas cache evict` applies the age/capacity retention policy. Both run
//! between analysis runs only, so eviction never causes misses mid-flight.

use anyhow::{bail, Result};
use sqlx::Row;

use crate::cache::AnalysisCache;
use crate::config::Config;

/// Run the `cache stats` command: query the store and print a summary.
pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let cache = AnalysisCache::open(&config.storage.cache_path).await?;

    let row = sqlx::query(
        "SELECT COUNT(*) AS entries, MIN(created_at) AS oldest, MAX(created_at) AS newest \
         FROM analysis_cache",
    )
    .fetch_one(cache.pool())
    .await?;

    let entries: i64 = row.get("entries");
    let oldest: Option<i64> = row.get("oldest");
    let newest: Option<i64> = row.get("newest");

    let store_size = std::fs::metadata(cache.store_path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Code Atlas — Analysis Cache Stats");
    println!("=================================");
    println!();
    println!("  Cache:      {}", cache.store_path().display());
    println!("  Size:       {}", format_bytes(store_size));
    println!("  Entries:    {}", entries);
    println!(
        "  Oldest:     {}",
        oldest.map_or_else(|| "never".to_string(), format_ts_relative)
    );
    println!(
        "  Newest:     {}",
        newest.map_or_else(|| "never".to_string(), format_ts_relative)
    );
    println!();

    cache.close().await;
    Ok(())
}

/// Run the `cache evict` command with the given retention policy.
pub async fn run_cache_evict(
    config: &Config,
    older_than_days: Option<u32>,
    max_entries: Option<u64>,
) -> Result<()> {
    if older_than_days.is_none() && max_entries.is_none() {
        bail!("cache evict requires --older-than-days and/or --max-entries");
    }

    let cache = AnalysisCache::open(&config.storage.cache_path).await?;
    let removed = cache.evict(older_than_days, max_entries).await?;

    println!("cache evict");
    println!("  removed: {}", removed);
    println!("  remaining: {}", cache.len());
    println!("ok");

    cache.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
