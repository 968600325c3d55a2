//! File ingestion.
//!
//! Reads a log file line by line and submits each non-empty line as a
//! [`RawEvent`] whose offset is the byte position of the line start. Lines
//! go through [`BatchedPublisher`], which is closed at the end so the final
//! partial batch is persisted before the command returns.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use logsift_core::models::RawEvent;

use crate::config::Config;
use crate::db;
use crate::publisher::{
    BatchedPublisher, DebugEventPublisher, Enricher, EventPublisher, FlushPolicy,
};
use crate::sqlite_store::SqliteEventStore;

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    source: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let source = source.unwrap_or_else(|| path.display().to_string());
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let layout = config.ingest.time_layout.as_str();

    if dry_run {
        let publisher = DebugEventPublisher::new(None);
        let lines = publish_lines(&publisher, reader, &source, layout).await?;
        println!("ingest {} (dry-run)", path.display());
        println!("  lines found: {}", lines);
        return Ok(());
    }

    let extractor = Arc::new(config.ingest.extractor()?);
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteEventStore::new(pool.clone()));
    let enricher = Enricher::new(config.ingest.host_name.clone(), extractor);
    let publisher =
        BatchedPublisher::spawn(store, enricher, FlushPolicy::from(&config.publisher));

    let published = publish_lines(&publisher, reader, &source, layout).await;
    // Flush whatever was accepted even when reading failed part way.
    publisher.close().await;
    let lines = published?;

    println!("ingest {}", path.display());
    println!("  source: {}", source);
    println!("  published: {} lines", lines);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Submit every non-empty line of `reader` to `publisher`, returning the
/// number of lines submitted.
///
/// Trailing `\n` and `\r\n` are stripped; invalid UTF-8 is replaced.
pub async fn publish_lines<P, R>(
    publisher: &P,
    mut reader: R,
    source: &str,
    time_layout: &str,
) -> Result<u64>
where
    P: EventPublisher + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut offset: i64 = 0;
    let mut published = 0u64;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await?;
        if read == 0 {
            break;
        }
        let line_start = offset;
        offset += read as i64;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        publisher
            .publish_event(
                RawEvent {
                    raw: line.to_string(),
                    source: source.to_string(),
                    offset: line_start,
                },
                time_layout,
            )
            .await;
        published += 1;
    }

    Ok(published)
}
