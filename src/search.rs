//! Exact search over the coarse event stream.
//!
//! [`SearchEngine::filter_events_stream`] compiles a [`Search`] once, opens a
//! [`filter_stream`] with its source, fragment and time constraints, and
//! re-checks every delivered event with
//! [`CompiledSearch::refine`]. Pages are forwarded one-for-one, empty ones
//! included, so output order is the store's reverse-chronological order.
//!
//! `logsift search` is a thin CLI wrapper over the engine.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use logsift_core::error::{CompileError, SearchError};
use logsift_core::extract::FieldExtractor;
use logsift_core::filter::CompiledSearch;
use logsift_core::models::{EventWithExtractedFields, EventWithId};
use logsift_core::query::Search;
use logsift_core::store::{EventStore, ScanQuery};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteEventStore;
use crate::stream::{filter_stream, FILTER_PAGE_SIZE};

/// Runs searches against one store with one set of extraction rules.
pub struct SearchEngine<S: ?Sized> {
    store: Arc<S>,
    extractor: Arc<FieldExtractor>,
    page_size: usize,
}

impl<S> SearchEngine<S>
where
    S: EventStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, extractor: Arc<FieldExtractor>) -> Self {
        Self {
            store,
            extractor,
            page_size: FILTER_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stream pages of events satisfying every constraint of `search`.
    ///
    /// Compilation failures are reported before any streaming starts. The
    /// refinement task stops as soon as the returned stream is dropped.
    pub fn filter_events_stream(
        &self,
        search: &Search,
    ) -> Result<ReceiverStream<Vec<EventWithExtractedFields>>, CompileError> {
        let compiled = CompiledSearch::compile(search)?;
        let mut pages = filter_stream(
            self.store.clone(),
            ScanQuery::from_search(search),
            self.page_size,
        );
        let extractor = self.extractor.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            while let Some(page) = pages.next().await {
                let refined: Vec<_> = page
                    .iter()
                    .filter_map(|event| compiled.refine(event, &extractor))
                    .collect();
                if tx.send(refined).await.is_err() {
                    tracing::debug!("search stream abandoned by consumer");
                    return;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Parse `query` and stream its results in one step.
    pub fn search(
        &self,
        query: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<ReceiverStream<Vec<EventWithExtractedFields>>, SearchError> {
        let search = Search::parse(query, start_time, end_time)?;
        Ok(self.filter_events_stream(&search)?)
    }

    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<EventWithId>> {
        self.store.get_by_ids(ids).await
    }
}

/// Parse a `--start`/`--end` bound: RFC 3339, or `YYYY-MM-DD` meaning the
/// start (or, with `end_of_day`, the last microsecond) of that UTC day.
pub fn parse_time_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid time bound '{}'. Use RFC 3339 or YYYY-MM-DD.",
            value
        )
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    start: Option<String>,
    end: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let start_time = start.as_deref().map(|s| parse_time_bound(s, false)).transpose()?;
    let end_time = end.as_deref().map(|s| parse_time_bound(s, true)).transpose()?;
    if let (Some(start), Some(end)) = (start_time, end_time) {
        if start > end {
            bail!("--start ({}) is after --end ({})", start, end);
        }
    }

    let extractor = Arc::new(config.ingest.extractor()?);

    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteEventStore::new(pool.clone()));
    let engine = SearchEngine::new(store, extractor);

    let mut pages = match engine.search(query, start_time, end_time) {
        Ok(pages) => pages,
        Err(e) => {
            pool.close().await;
            return Err(e).with_context(|| format!("Invalid query: {}", query));
        }
    };
    let mut shown = 0usize;
    'pages: while let Some(page) = pages.next().await {
        for event in page {
            if limit.is_some_and(|limit| shown >= limit) {
                break 'pages;
            }
            shown += 1;
            if json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                print_event(shown, &event);
            }
        }
    }
    drop(pages);

    if shown == 0 && !json {
        println!("No results.");
    }

    pool.close().await;
    Ok(())
}

fn print_event(rank: usize, event: &EventWithExtractedFields) {
    println!(
        "{}. [{}] {} (id {})",
        rank,
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.source,
        event.id
    );
    println!("    {}", event.raw);
    let fields: Vec<String> = event
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if !fields.is_empty() {
        println!("    fields: {}", fields.join(" "));
    }
    println!();
}
