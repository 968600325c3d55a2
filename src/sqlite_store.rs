//! SQLite-backed [`EventStore`] implementation.
//!
//! Events live in the `events` table and their raw text in the FTS5 table
//! `event_raws`, joined on `rowid = id`. Every statement is assembled with
//! [`QueryBuilder`] and bound parameters; the only full-text syntax that
//! reaches SQLite is the output of
//! [`MatchExpr::to_fts5`](logsift_core::match_expr::MatchExpr::to_fts5),
//! itself passed as a bound value.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use logsift_core::models::{Event, EventWithId};
use logsift_core::store::{EventStore, PageCursor, ScanQuery};

const SELECT_EVENTS: &str = r#"SELECT e.id, e.host, e.source, e.timestamp, e."offset", r.raw
FROM events e INNER JOIN event_raws r ON r.rowid = e.id"#;

/// SQLite implementation of the [`EventStore`] trait.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored event count per source, largest first.
    pub async fn count_by_source(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM events GROUP BY source ORDER BY n DESC, source ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("source"), row.get("n")))
            .collect())
    }

    /// Timestamp of the newest stored event, if any.
    pub async fn newest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let newest: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM events")
            .fetch_one(&self.pool)
            .await?;
        newest.map(from_micros).transpose()
    }

    /// Insert `events` in one transaction, skipping duplicates.
    ///
    /// Any error other than a `(source, timestamp, offset)` conflict rolls
    /// the whole batch back.
    pub async fn insert_batch(&self, events: &[Event]) -> Result<BatchReport> {
        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction for event batch")?;

        let mut report = BatchReport {
            ids: Vec::with_capacity(events.len()),
            skipped: BTreeMap::new(),
        };

        for evt in events {
            let inserted = sqlx::query(
                r#"INSERT INTO events (host, source, timestamp, "offset") VALUES (?, ?, ?, ?)"#,
            )
            .bind(&evt.host)
            .bind(&evt.source)
            .bind(evt.timestamp.timestamp_micros())
            .bind(evt.offset)
            .execute(&mut *tx)
            .await;

            let id = match inserted {
                Ok(done) => done.last_insert_rowid(),
                Err(err) if is_unique_violation(&err) => {
                    *report.skipped.entry(evt.source.clone()).or_default() += 1;
                    report.ids.push(0);
                    continue;
                }
                Err(err) => return Err(err).context("failed to insert event"),
            };

            sqlx::query("INSERT INTO event_raws (rowid, raw, source) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&evt.raw)
                .bind(&evt.source)
                .execute(&mut *tx)
                .await
                .context("failed to index event text")?;

            report.ids.push(id);
        }

        tx.commit().await.context("failed to commit event batch")?;
        Ok(report)
    }
}

/// Outcome of one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Identity per input event, in input order; `0` for skipped duplicates.
    pub ids: Vec<i64>,
    /// Skipped duplicate count per source.
    pub skipped: BTreeMap<String, u64>,
}

impl BatchReport {
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("stored timestamp out of range: {}", micros))
}

fn row_to_event(row: &SqliteRow) -> Result<EventWithId> {
    Ok(EventWithId {
        id: row.try_get("id")?,
        raw: row.try_get("raw")?,
        host: row.try_get("host")?,
        source: row.try_get("source")?,
        offset: row.try_get("offset")?,
        timestamp: from_micros(row.try_get("timestamp")?)?,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn add_batch(&self, events: &[Event]) -> Result<Vec<i64>> {
        let started = Instant::now();
        let report = self.insert_batch(events).await?;

        for (source, skipped) in &report.skipped {
            tracing::info!(
                source = %source,
                skipped = *skipped,
                "skipped duplicate events (same source, timestamp and offset as an existing event)"
            );
        }
        tracing::info!(
            events = events.len(),
            inserted = events.len() as u64 - report.skipped_total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "added event batch"
        );

        Ok(report.ids)
    }

    async fn next_id(&self) -> Result<i64> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(next)
    }

    async fn scan_page(
        &self,
        query: &ScanQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<EventWithId>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EVENTS);
        qb.push(" WHERE e.id < ").push_bind(cursor.below_id);

        if let Some((ts, id)) = cursor.after {
            let ts = ts.timestamp_micros();
            qb.push(" AND (e.timestamp < ")
                .push_bind(ts)
                .push(" OR (e.timestamp = ")
                .push_bind(ts)
                .push(" AND e.id < ")
                .push_bind(id)
                .push("))");
        }
        if let Some(start) = query.start_time {
            qb.push(" AND e.timestamp >= ")
                .push_bind(start.timestamp_micros());
        }
        if let Some(end) = query.end_time {
            qb.push(" AND e.timestamp <= ").push_bind(end.timestamp_micros());
        }
        if !query.sources.is_empty() {
            qb.push(" AND e.source IN (");
            let mut list = qb.separated(", ");
            for source in &query.sources {
                list.push_bind(source.clone());
            }
            list.push_unseparated(")");
        }
        if !query.not_sources.is_empty() {
            qb.push(" AND e.source NOT IN (");
            let mut list = qb.separated(", ");
            for source in &query.not_sources {
                list.push_bind(source.clone());
            }
            list.push_unseparated(")");
        }
        if let Some(text) = &query.text {
            qb.push(" AND e.id IN (SELECT rowid FROM event_raws WHERE event_raws MATCH ")
                .push_bind(text.to_fts5())
                .push(")");
        }
        qb.push(" ORDER BY e.timestamp DESC, e.id DESC LIMIT ")
            .push_bind(limit as i64);

        tracing::debug!(sql = qb.sql(), match_expr = ?query.text, "executing scan page");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<EventWithId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EVENTS);
        qb.push(" WHERE e.id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(") ORDER BY e.id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("failed to look up events by id")?;
        rows.iter().map(row_to_event).collect()
    }
}
