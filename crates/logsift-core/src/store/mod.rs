//! Storage abstraction for events.
//!
//! The [`EventStore`] trait covers the operations the ingestion and search
//! pipelines need: atomic batch inserts with duplicate skipping, a
//! single-page coarse scan, and point lookups. Streaming (snapshotting the
//! identity bound and walking pages) is built on top of
//! [`EventStore::next_id`] and [`EventStore::scan_page`] by the caller.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::match_expr::MatchExpr;
use crate::models::{Event, EventWithId};
use crate::query::Search;

/// Coarse constraints pushed down to the store.
///
/// Sources are matched exactly; `text` is the approximate full-text
/// expression built from the search fragments (`None` = no text
/// constraint). Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanQuery {
    pub sources: BTreeSet<String>,
    pub not_sources: BTreeSet<String>,
    pub text: Option<MatchExpr>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanQuery {
    pub fn new(
        sources: BTreeSet<String>,
        not_sources: BTreeSet<String>,
        fragments: &BTreeSet<String>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            sources,
            not_sources,
            text: MatchExpr::any_fragment(fragments),
            start_time,
            end_time,
        }
    }

    /// The coarse part of a parsed search.
    pub fn from_search(search: &Search) -> Self {
        Self::new(
            search.sources.clone(),
            search.not_sources.clone(),
            &search.fragments,
            search.start_time,
            search.end_time,
        )
    }

    /// Whether an event satisfies the coarse constraints.
    pub fn admits(&self, event: &EventWithId) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&event.source) {
            return false;
        }
        if self.not_sources.contains(&event.source) {
            return false;
        }
        if self.start_time.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        self.text.as_ref().map_or(true, |expr| expr.matches(&event.raw))
    }
}

/// Position within a reverse-chronological scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Exclusive identity bound fixed when the scan started.
    pub below_id: i64,
    /// `(timestamp, id)` of the last event already delivered.
    pub after: Option<(DateTime<Utc>, i64)>,
}

impl PageCursor {
    pub fn start(below_id: i64) -> Self {
        Self {
            below_id,
            after: None,
        }
    }

    /// Move past `last`, the final event of the page just delivered.
    pub fn advance(&mut self, last: &EventWithId) {
        self.after = Some((last.timestamp, last.id));
    }

    /// Whether `event` lies strictly beyond this cursor in scan order.
    pub fn precedes(&self, event: &EventWithId) -> bool {
        if event.id >= self.below_id {
            return false;
        }
        match self.after {
            Some(after) => (event.timestamp, event.id) < after,
            None => true,
        }
    }
}

/// Scan order: newest timestamp first, then highest identity first.
pub fn scan_order(a: &EventWithId, b: &EventWithId) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id))
}

/// Durable repository of events with a full-text index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_batch`](EventStore::add_batch) | Insert events atomically, skipping duplicates |
/// | [`next_id`](EventStore::next_id) | Identity bound for a consistent scan |
/// | [`scan_page`](EventStore::scan_page) | One page of a coarse reverse-chronological scan |
/// | [`get_by_ids`](EventStore::get_by_ids) | Point lookup |
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert all events in one transaction.
    ///
    /// An event whose `(source, timestamp, offset)` already exists is
    /// skipped and reported as identity `0`; the remaining events are still
    /// committed. Any other failure rolls back the whole batch.
    async fn add_batch(&self, events: &[Event]) -> Result<Vec<i64>>;

    /// An identity strictly greater than that of every stored event.
    async fn next_id(&self) -> Result<i64>;

    /// Fetch up to `limit` events admitted by `query` that come after
    /// `cursor`, in [`scan_order`].
    async fn scan_page(
        &self,
        query: &ScanQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<EventWithId>>;

    /// Look up events by identity. Unknown identities are ignored.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<EventWithId>>;
}
