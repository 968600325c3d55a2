//! Idempotent schema creation.
//!
//! - `events` holds one row per persisted event. `(source, timestamp,
//!   offset)` is unique and `AUTOINCREMENT` keeps identities from ever
//!   being reused. Timestamps are UTC microseconds since the epoch.
//! - `event_raws` is an FTS5 table over the raw text and source whose
//!   `rowid` equals the event identity.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host TEXT NOT NULL,
            source TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            "offset" INTEGER NOT NULL,
            UNIQUE(source, timestamp, "offset")
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp_id ON events(timestamp DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='event_raws'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query("CREATE VIRTUAL TABLE event_raws USING fts5(raw, source)")
            .execute(pool)
            .await?;
    }

    Ok(())
}
