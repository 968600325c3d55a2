//! Event retrieval by identity.
//!
//! Used by `logsift get`. Identities that do not exist are reported on
//! stderr; the command fails only when none of them exist.

use anyhow::{bail, Result};

use logsift_core::models::EventWithId;
use logsift_core::store::EventStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteEventStore;

/// Fetch `ids` from the configured database, ascending by identity.
pub async fn get_events(config: &Config, ids: &[i64]) -> Result<Vec<EventWithId>> {
    let pool = db::connect(config).await?;
    let store = SqliteEventStore::new(pool.clone());
    let events = store.get_by_ids(ids).await;
    pool.close().await;
    events
}

/// CLI entry point: prints each found event.
pub async fn run_get(config: &Config, ids: &[i64], json: bool) -> Result<()> {
    let events = get_events(config, ids).await?;

    for id in missing_ids(ids, &events) {
        eprintln!("event not found: {}", id);
    }
    if events.is_empty() {
        bail!("none of the requested events exist");
    }

    for event in &events {
        if json {
            println!("{}", serde_json::to_string(event)?);
            continue;
        }
        println!("--- Event {} ---", event.id);
        println!("timestamp: {}", event.timestamp.to_rfc3339());
        println!("host:      {}", event.host);
        println!("source:    {}", event.source);
        println!("offset:    {}", event.offset);
        println!("{}", event.raw);
        println!();
    }

    Ok(())
}

fn missing_ids(requested: &[i64], found: &[EventWithId]) -> Vec<i64> {
    let mut missing: Vec<i64> = requested
        .iter()
        .copied()
        .filter(|id| !found.iter().any(|e| e.id == *id))
        .collect();
    missing.sort_unstable();
    missing.dedup();
    missing
}
