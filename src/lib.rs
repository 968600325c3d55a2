//! # logsift
//!
//! Log ingestion and full-text search over SQLite.
//!
//! Raw log lines are enriched with host identity and a timestamp, batched
//! into SQLite (an `events` table plus an FTS5 index over the raw text), and
//! searched with a small query language. Searches run in two stages: a
//! coarse full-text and source query against the index, then exact
//! refinement with compiled matchers and extracted fields.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ log lines  │──▶│  Publisher   │──▶│    SQLite     │
//! │ (ingest)   │   │ enrich+batch │   │ events + FTS5 │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ pages
//!                   ┌──────────────┐   ┌─────▼────────┐
//!                   │ SearchEngine │◀──│ filter_stream│
//!                   │   refine     │   │  (snapshot)  │
//!                   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! logsift init
//! logsift ingest /var/log/app.log --source app
//! logsift search 'ERROR NOT user=alice source=app' --limit 20
//! logsift get 42 43
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`EventStore`](logsift_core::store::EventStore) |
//! | [`publisher`] | Enrichment and batched writes |
//! | [`stream`] | Snapshot-bounded paged scans |
//! | [`search`] | Exact search engine and `search` command |
//! | [`ingest`] | File ingestion |
//! | [`get`] | Point lookup |
//! | [`stats`] | Database statistics |
//!
//! The query parser, field extraction and matcher compilation live in the
//! runtime-free `logsift-core` crate.

pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod publisher;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod stream;
