//! Database statistics.
//!
//! `logsift stats` prints the database size, the total event count and a
//! per-source breakdown.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteEventStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteEventStore::new(pool.clone());

    let by_source = store.count_by_source().await?;
    let total: i64 = by_source.iter().map(|(_, n)| n).sum();
    let newest = store.newest_timestamp().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("logsift database stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Events:      {}", total);
    if let Some(ts) = newest {
        println!("  Newest:      {}", ts.format("%Y-%m-%d %H:%M:%S"));
    }

    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>10}", "SOURCE", "EVENTS");
        println!("  {}", "-".repeat(59));
        for (source, count) in &by_source {
            println!("  {:<48} {:>10}", source, count);
        }
    }

    println!();

    pool.close().await;
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
