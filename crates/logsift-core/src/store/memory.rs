//! In-memory [`EventStore`] implementation for tests and embedding.
//!
//! Events live in a `Vec` behind `std::sync::RwLock`. The coarse text match
//! evaluates the same [`MatchExpr`](crate::match_expr::MatchExpr) the SQLite
//! backend renders for FTS5.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Event, EventWithId};

use super::{scan_order, EventStore, PageCursor, ScanQuery};

#[derive(Default)]
struct Inner {
    events: Vec<EventWithId>,
    keys: HashSet<(String, DateTime<Utc>, i64)>,
    last_id: i64,
}

/// In-memory event store.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn add_batch(&self, events: &[Event]) -> Result<Vec<i64>> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(events.len());
        for evt in events {
            let key = (evt.source.clone(), evt.timestamp, evt.offset);
            if !inner.keys.insert(key) {
                ids.push(0);
                continue;
            }
            inner.last_id += 1;
            let id = inner.last_id;
            inner.events.push(EventWithId {
                id,
                raw: evt.raw.clone(),
                host: evt.host.clone(),
                source: evt.source.clone(),
                offset: evt.offset,
                timestamp: evt.timestamp,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn next_id(&self) -> Result<i64> {
        Ok(self.inner.read().unwrap().last_id + 1)
    }

    async fn scan_page(
        &self,
        query: &ScanQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<EventWithId>> {
        let inner = self.inner.read().unwrap();
        let mut page: Vec<EventWithId> = inner
            .events
            .iter()
            .filter(|e| cursor.precedes(e) && query.admits(e))
            .cloned()
            .collect();
        page.sort_by(scan_order);
        page.truncate(limit);
        Ok(page)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<EventWithId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }
}
