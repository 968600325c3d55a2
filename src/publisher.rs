//! Batched write path.
//!
//! [`EventPublisher::publish_event`] is fire-and-forget: the caller learns
//! about enrichment problems (logged as warnings in its own context) but
//! never about storage failures, which are only logged by the flush task.
//!
//! [`BatchedPublisher`] owns a single flush task per store. The task is the
//! only owner of the accumulation buffer and flushes it when either
//!
//! 1. the buffer reaches `batch_size` events (the timer is then restarted), or
//! 2. `interval` elapses since the last flush, whatever the buffer holds.
//!
//! Flushes run inline in the task, so at most one is in flight; events
//! submitted meanwhile queue in the channel and land in the next batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use logsift_core::extract::{FieldExtractor, TIME_FIELD};
use logsift_core::models::{Event, RawEvent};
use logsift_core::store::EventStore;

use crate::config::PublisherConfig;

/// Submission of raw events for eventual durable storage.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Submit one event. Returns once the event has been handed over, not
    /// once it is persisted; persistence failures are never reported back.
    async fn publish_event(&self, event: RawEvent, time_layout: &str);
}

/// Parse an extracted `_time` value with a chrono `strftime` layout.
///
/// Layouts with an offset yield that instant; layouts without one are read
/// as UTC, and date-only layouts as UTC midnight.
pub fn parse_event_time(
    value: &str,
    layout: &str,
) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_str(value, layout)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, layout).map(|dt| dt.and_utc()))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, layout).map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
}

/// Turns raw events into storable events: host identity plus a timestamp
/// derived from the `_time` field.
#[derive(Debug, Clone)]
pub struct Enricher {
    host: String,
    extractor: Arc<FieldExtractor>,
}

impl Enricher {
    pub fn new(host: impl Into<String>, extractor: Arc<FieldExtractor>) -> Self {
        Self {
            host: host.into(),
            extractor,
        }
    }

    /// Enrich `raw`, falling back to `now` when `_time` is missing or does
    /// not parse with `time_layout`.
    pub fn enrich(&self, raw: RawEvent, time_layout: &str, now: DateTime<Utc>) -> Event {
        let fields = self.extractor.extract(&raw.raw.to_lowercase());
        let timestamp = match fields.get(TIME_FIELD) {
            Some(value) => match parse_event_time(value, time_layout) {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(
                        source = %raw.source,
                        offset = raw.offset,
                        value = %value,
                        layout = time_layout,
                        "failed to parse _time field, will use current time as timestamp: {}",
                        e
                    );
                    now
                }
            },
            None => now,
        };

        Event {
            raw: raw.raw,
            host: self.host.clone(),
            source: raw.source,
            offset: raw.offset,
            timestamp,
        }
    }
}

/// Flush thresholds for a [`BatchedPublisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub batch_size: usize,
    pub interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            interval: Duration::from_secs(1),
        }
    }
}

impl From<&PublisherConfig> for FlushPolicy {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            interval: config.flush_interval(),
        }
    }
}

/// Publisher that batches events into a store through one flush task.
pub struct BatchedPublisher {
    enricher: Enricher,
    sender: mpsc::Sender<Event>,
    task: JoinHandle<()>,
}

impl BatchedPublisher {
    /// Start the flush task for `store`. Must be called inside a tokio runtime.
    pub fn spawn<S>(store: Arc<S>, enricher: Enricher, policy: FlushPolicy) -> Self
    where
        S: EventStore + ?Sized + 'static,
    {
        let policy = FlushPolicy {
            batch_size: policy.batch_size.max(1),
            ..policy
        };
        let (sender, receiver) = mpsc::channel(policy.batch_size);
        let task = tokio::spawn(run_flush_task(store, receiver, policy));
        Self {
            enricher,
            sender,
            task,
        }
    }

    /// Stop accepting events and wait until everything already submitted
    /// has been flushed.
    pub async fn close(self) {
        let Self { sender, task, .. } = self;
        drop(sender);
        if let Err(e) = task.await {
            tracing::error!("publisher flush task failed: {}", e);
        }
    }
}

#[async_trait]
impl EventPublisher for BatchedPublisher {
    async fn publish_event(&self, event: RawEvent, time_layout: &str) {
        let processed = self.enricher.enrich(event, time_layout, Utc::now());
        if self.sender.send(processed).await.is_err() {
            tracing::error!("publisher flush task has stopped, dropping event");
        }
    }
}

async fn run_flush_task<S>(
    store: Arc<S>,
    mut receiver: mpsc::Receiver<Event>,
    policy: FlushPolicy,
) where
    S: EventStore + ?Sized,
{
    let mut accumulated: Vec<Event> = Vec::with_capacity(policy.batch_size);
    let timer = tokio::time::sleep(policy.interval);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(event) => {
                    accumulated.push(event);
                    if accumulated.len() >= policy.batch_size {
                        flush(store.as_ref(), &mut accumulated).await;
                        timer.as_mut().reset(Instant::now() + policy.interval);
                    }
                }
                None => {
                    flush(store.as_ref(), &mut accumulated).await;
                    return;
                }
            },
            _ = &mut timer => {
                flush(store.as_ref(), &mut accumulated).await;
                timer.as_mut().reset(Instant::now() + policy.interval);
            }
        }
    }
}

async fn flush<S>(store: &S, accumulated: &mut Vec<Event>)
where
    S: EventStore + ?Sized,
{
    if accumulated.is_empty() {
        return;
    }
    if let Err(e) = store.add_batch(accumulated).await {
        tracing::error!("error when adding {} events: {:#}", accumulated.len(), e);
    }
    accumulated.clear();
}

/// Logs every event before handing it to an optional inner publisher.
pub struct DebugEventPublisher {
    inner: Option<Arc<dyn EventPublisher>>,
}

impl DebugEventPublisher {
    pub fn new(inner: Option<Arc<dyn EventPublisher>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EventPublisher for DebugEventPublisher {
    async fn publish_event(&self, event: RawEvent, time_layout: &str) {
        tracing::info!(?event, "received event");
        if let Some(inner) = &self.inner {
            inner.publish_event(event, time_layout).await;
        }
    }
}

/// Discards every event.
pub struct NopEventPublisher;

#[async_trait]
impl EventPublisher for NopEventPublisher {
    async fn publish_event(&self, _event: RawEvent, _time_layout: &str) {}
}
