//! Integration tests for the SQLite event store and the search engine on
//! top of it, against a real database in a temporary directory.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use logsift::config::PublisherConfig;
use logsift::db;
use logsift::migrate;
use logsift::publisher::{BatchedPublisher, Enricher, EventPublisher, FlushPolicy};
use logsift::search::SearchEngine;
use logsift::sqlite_store::SqliteEventStore;
use logsift::stream::filter_stream;
use logsift_core::extract::FieldExtractor;
use logsift_core::models::{Event, EventWithExtractedFields, RawEvent};
use logsift_core::query::Search;
use logsift_core::store::{EventStore, PageCursor, ScanQuery};
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

async fn open_store() -> (TempDir, Arc<SqliteEventStore>) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/logsift.sqlite"))
        .await
        .unwrap();
    migrate::migrate(&pool).await.unwrap();
    (tmp, Arc::new(SqliteEventStore::new(pool)))
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

fn event(source: &str, raw: &str, offset: i64, secs: i64) -> Event {
    Event {
        raw: raw.to_string(),
        host: "test-host".to_string(),
        source: source.to_string(),
        offset,
        timestamp: base() + Duration::seconds(secs),
    }
}

fn extractor() -> Arc<FieldExtractor> {
    Arc::new(FieldExtractor::from_patterns([r"(\w+)=(\w+)"]).unwrap())
}

async fn scan_all(store: &SqliteEventStore, query: &ScanQuery) -> Vec<String> {
    let below = store.next_id().await.unwrap();
    store
        .scan_page(query, &PageCursor::start(below), 1000)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.raw)
        .collect()
}

async fn search(
    engine: &SearchEngine<SqliteEventStore>,
    query: &str,
) -> Vec<EventWithExtractedFields> {
    let search = Search::parse(query, None, None).unwrap();
    let pages: Vec<Vec<EventWithExtractedFields>> = engine
        .filter_events_stream(&search)
        .unwrap()
        .collect()
        .await;
    pages.into_iter().flatten().collect()
}

#[tokio::test]
async fn test_add_batch_assigns_increasing_ids() {
    let (_tmp, store) = open_store().await;

    let ids = store
        .add_batch(&[event("a", "one", 0, 0), event("a", "two", 4, 1)])
        .await
        .unwrap();
    assert_eq!(ids, vec![1, 2]);

    let ids = store.add_batch(&[event("a", "three", 8, 2)]).await.unwrap();
    assert_eq!(ids, vec![3]);
    assert_eq!(store.next_id().await.unwrap(), 4);
}

#[tokio::test]
async fn test_add_batch_skips_duplicates_without_failing_batch() {
    let (_tmp, store) = open_store().await;
    store.add_batch(&[event("a", "one", 0, 0)]).await.unwrap();

    let ids = store
        .add_batch(&[
            event("a", "one again", 0, 0),
            event("a", "new", 10, 5),
            event("b", "same key other source", 0, 0),
        ])
        .await
        .unwrap();
    assert_eq!(ids[0], 0);
    assert!(ids[1] > 1);
    assert!(ids[2] > ids[1]);

    let counts = store.count_by_source().await.unwrap();
    assert_eq!(counts, vec![("a".to_string(), 2), ("b".to_string(), 1)]);

    // The skipped row left nothing behind in the text index.
    let raws = scan_all(&store, &ScanQuery::default()).await;
    assert!(!raws.contains(&"one again".to_string()));
    assert_eq!(raws.len(), 3);
}

#[tokio::test]
async fn test_insert_batch_reports_skips_per_source() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[event("a", "one", 0, 0), event("b", "two", 0, 0)])
        .await
        .unwrap();

    let report = store
        .insert_batch(&[
            event("a", "one again", 0, 0),
            event("a", "fresh", 1, 1),
            event("b", "two again", 0, 0),
            event("b", "two once more", 0, 0),
        ])
        .await
        .unwrap();
    assert_eq!(report.ids[0], 0);
    assert!(report.ids[1] > 0);
    assert_eq!(&report.ids[2..], &[0, 0]);
    assert_eq!(report.skipped.get("a"), Some(&1));
    assert_eq!(report.skipped.get("b"), Some(&2));
    assert_eq!(report.skipped_total(), 3);
}

/// Collects the `source` of every duplicate-skip log line.
#[derive(Clone, Default)]
struct SkipLogCollector {
    sources: Arc<Mutex<Vec<String>>>,
}

#[derive(Default)]
struct SkipLogVisitor {
    message: String,
    source: String,
}

impl Visit for SkipLogVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "source" => self.source = format!("{:?}", value),
            _ => {}
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for SkipLogCollector {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = SkipLogVisitor::default();
        event.record(&mut visitor);
        if visitor.message.starts_with("skipped duplicate events") {
            self.sources.lock().unwrap().push(visitor.source);
        }
    }
}

#[tokio::test]
async fn test_add_batch_logs_one_skip_line_per_source() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[event("a", "one", 0, 0), event("b", "two", 0, 0)])
        .await
        .unwrap();

    let collector = SkipLogCollector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    store
        .add_batch(&[
            event("a", "dup 1", 0, 0),
            event("b", "dup 2", 0, 0),
            event("b", "dup 3", 0, 0),
            event("c", "new", 0, 0),
        ])
        .await
        .unwrap();

    let sources = collector.sources.lock().unwrap().clone();
    assert_eq!(sources, vec!["a", "b"]);
}

#[tokio::test]
async fn test_add_batch_failure_rolls_back_everything() {
    let (tmp, store) = open_store().await;
    let pool = db::connect_path(&tmp.path().join("data/logsift.sqlite"))
        .await
        .unwrap();
    sqlx::query("DROP TABLE event_raws")
        .execute(&pool)
        .await
        .unwrap();

    let result = store
        .add_batch(&[event("a", "one", 0, 0), event("a", "two", 1, 1)])
        .await;
    assert!(result.is_err());

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
    pool.close().await;
}

#[tokio::test]
async fn test_newest_timestamp() {
    let (_tmp, store) = open_store().await;
    assert_eq!(store.newest_timestamp().await.unwrap(), None);

    store
        .add_batch(&[
            event("a", "old", 0, 0),
            event("a", "new", 1, 30),
            event("b", "mid", 0, 10),
        ])
        .await
        .unwrap();
    assert_eq!(
        store.newest_timestamp().await.unwrap(),
        Some(base() + Duration::seconds(30))
    );
}

#[tokio::test]
async fn test_empty_batch() {
    let (_tmp, store) = open_store().await;
    assert!(store.add_batch(&[]).await.unwrap().is_empty());
    assert_eq!(store.next_id().await.unwrap(), 1);
}

#[tokio::test]
async fn test_scan_order_and_ties() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[
            event("a", "middle", 0, 5),
            event("a", "oldest", 1, 0),
            event("a", "newest", 2, 10),
            event("a", "tie later id", 3, 5),
        ])
        .await
        .unwrap();

    let raws = scan_all(&store, &ScanQuery::default()).await;
    assert_eq!(raws, vec!["newest", "tie later id", "middle", "oldest"]);
}

#[tokio::test]
async fn test_scan_fragment_and_source_predicates() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[
            event("/var/log/a.log", "ERROR disk full", 0, 0),
            event("/var/log/b.log", "error net down", 0, 1),
            event("/var/log/a.log", "INFO all good", 1, 2),
            event("/var/log/a.log", "connection refused", 2, 3),
        ])
        .await
        .unwrap();

    let fragments = ["error".to_string()].into_iter().collect();
    let q = ScanQuery::new(Default::default(), Default::default(), &fragments, None, None);
    assert_eq!(scan_all(&store, &q).await, vec!["error net down", "ERROR disk full"]);

    let sources = ["/var/log/a.log".to_string()].into_iter().collect();
    let q = ScanQuery::new(sources, Default::default(), &fragments, None, None);
    assert_eq!(scan_all(&store, &q).await, vec!["ERROR disk full"]);

    let not_sources = ["/var/log/a.log".to_string()].into_iter().collect();
    let q = ScanQuery::new(Default::default(), not_sources, &Default::default(), None, None);
    assert_eq!(scan_all(&store, &q).await, vec!["error net down"]);

    let prefix = ["conn*".to_string()].into_iter().collect();
    let q = ScanQuery::new(Default::default(), Default::default(), &prefix, None, None);
    assert_eq!(scan_all(&store, &q).await, vec!["connection refused"]);
}

#[tokio::test]
async fn test_wildcard_inside_word_reaches_refinement() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[
            event("a", "2024-01-01 ERROR disk full", 0, 0),
            event("a", "2024-01-01 INFO all good", 1, 1),
        ])
        .await
        .unwrap();
    let engine = SearchEngine::new(store, extractor());

    for query in ["err*r", "*rror", "e*or", "ERROR"] {
        let raws: Vec<String> = search(&engine, query)
            .await
            .into_iter()
            .map(|e| e.raw)
            .collect();
        assert_eq!(raws, vec!["2024-01-01 ERROR disk full"], "query {}", query);
    }
}

#[tokio::test]
async fn test_scan_hostile_fragment_is_literal() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[event("a", "say \"hi\" OR NEAR(x) AND", 0, 0)])
        .await
        .unwrap();

    let fragments = ["\"hi\" OR NEAR(x".to_string()].into_iter().collect();
    let q = ScanQuery::new(Default::default(), Default::default(), &fragments, None, None);
    assert_eq!(scan_all(&store, &q).await.len(), 1);
}

#[tokio::test]
async fn test_scan_time_bounds_inclusive() {
    let (_tmp, store) = open_store().await;
    let events: Vec<Event> = (0..5).map(|i| event("a", &format!("e{}", i), i, i)).collect();
    store.add_batch(&events).await.unwrap();

    let q = ScanQuery::new(
        Default::default(),
        Default::default(),
        &Default::default(),
        Some(base() + Duration::seconds(1)),
        Some(base() + Duration::seconds(3)),
    );
    assert_eq!(scan_all(&store, &q).await, vec!["e3", "e2", "e1"]);
}

#[tokio::test]
async fn test_filter_stream_pages_and_snapshot() {
    let (_tmp, store) = open_store().await;
    let events: Vec<Event> = (0..7).map(|i| event("a", &format!("line {}", i), i, i)).collect();
    store.add_batch(&events).await.unwrap();

    let mut pages = filter_stream(store.clone(), ScanQuery::default(), 3);
    let first = pages.next().await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].raw, "line 6");

    // Written after the snapshot, so never delivered.
    store
        .add_batch(&[event("a", "late", 100, 1000)])
        .await
        .unwrap();

    let mut rest = Vec::new();
    while let Some(page) = pages.next().await {
        rest.push(page);
    }
    let sizes: Vec<usize> = rest.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 1]);
    assert!(rest.iter().flatten().all(|e| e.raw != "late"));
}

#[tokio::test]
async fn test_get_by_ids() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[event("a", "one", 0, 0), event("b", "two", 0, 1)])
        .await
        .unwrap();

    let found = store.get_by_ids(&[2, 1, 42]).await.unwrap();
    let ids: Vec<i64> = found.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(found[1].source, "b");
    assert_eq!(found[1].timestamp, base() + Duration::seconds(1));
    assert_eq!(found[0].host, "test-host");

    assert!(store.get_by_ids(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_end_to_end() {
    let (_tmp, store) = open_store().await;
    store
        .add_batch(&[
            event("A", "ERROR disk full user=alice", 0, 0),
            event("B", "ERROR net down user=alice", 0, 1),
            event("A", "INFO started user=bob", 1, 2),
            event("A", "ERROR quota user=bob", 2, 3),
        ])
        .await
        .unwrap();
    let engine = SearchEngine::new(store, extractor());

    let raws: Vec<String> = search(&engine, "ERROR source=A")
        .await
        .into_iter()
        .map(|e| e.raw)
        .collect();
    assert_eq!(raws, vec!["ERROR quota user=bob", "ERROR disk full user=alice"]);

    let results = search(&engine, "NOT ERROR user=bob").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].raw, "INFO started user=bob");
    assert_eq!(results[0].fields.get("user").map(String::as_str), Some("bob"));

    let first = search(&engine, "user=alice source!=B").await;
    let second = search(&engine, "user=alice source!=B").await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[tokio::test]
async fn test_publisher_persists_through_sqlite() {
    let (_tmp, store) = open_store().await;
    let extractor = Arc::new(
        FieldExtractor::from_patterns([r"^(?P<_time>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})"]).unwrap(),
    );
    let policy = FlushPolicy::from(&PublisherConfig {
        batch_size: 2,
        flush_interval_ms: 20,
    });
    assert_eq!(policy.interval, StdDuration::from_millis(20));

    let publisher = BatchedPublisher::spawn(
        store.clone(),
        Enricher::new("web-1", extractor),
        policy,
    );
    for (offset, line) in [
        "2024/05/01 08:00:00 first",
        "2024/05/01 08:00:01 second",
        "2024/05/01 08:00:02 third",
    ]
    .iter()
    .enumerate()
    {
        publisher
            .publish_event(
                RawEvent {
                    raw: line.to_string(),
                    source: "app".to_string(),
                    offset: offset as i64,
                },
                "%Y/%m/%d %H:%M:%S",
            )
            .await;
    }
    publisher.close().await;

    let stored = store.get_by_ids(&[1, 2, 3]).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].timestamp, base());
    assert_eq!(stored[2].timestamp, base() + Duration::seconds(2));
    assert!(stored.iter().all(|e| e.host == "web-1"));
}
