//! Paged reverse-chronological scans over an [`EventStore`].
//!
//! [`filter_stream`] snapshots the store's identity bound once, then walks
//! pages of the coarse query strictly below it. Events inserted after the
//! scan started never show up, so concurrent writes cannot shift pages.
//!
//! The producer runs as its own task and hands pages over a channel with
//! room for one page, so it never runs more than a page ahead of the
//! consumer. Dropping the stream stops the producer at its next send.
//! Store errors are logged and end the stream; consumers cannot tell them
//! apart from the natural end of data.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use logsift_core::models::EventWithId;
use logsift_core::store::{EventStore, PageCursor, ScanQuery};

/// Rows fetched per store round trip.
pub const FILTER_PAGE_SIZE: usize = 1000;

/// Stream pages of events matching `query`, newest first.
pub fn filter_stream<S>(
    store: Arc<S>,
    query: ScanQuery,
    page_size: usize,
) -> ReceiverStream<Vec<EventWithId>>
where
    S: EventStore + ?Sized + 'static,
{
    let page_size = page_size.max(1);
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let below_id = match store.next_id().await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("failed to snapshot event identity for filter stream: {:#}", e);
                return;
            }
        };

        let mut cursor = PageCursor::start(below_id);
        loop {
            let page = match store.scan_page(&query, &cursor, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("failed to fetch filter stream page: {:#}", e);
                    return;
                }
            };

            let full = page.len() >= page_size;
            if let Some(last) = page.last() {
                cursor.advance(last);
            }
            if tx.send(page).await.is_err() {
                tracing::debug!("filter stream abandoned by consumer");
                return;
            }
            if !full {
                return;
            }
        }
    });

    ReceiverStream::new(rx)
}
