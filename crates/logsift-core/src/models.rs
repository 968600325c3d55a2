//! Event types that flow through ingestion and search.
//!
//! An event starts life as a [`RawEvent`] handed over by whatever tails a
//! log source, is enriched into an [`Event`] by the publisher, receives an
//! identity from the store ([`EventWithId`]), and is finally returned to
//! search callers as an [`EventWithExtractedFields`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An observed log line that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub raw: String,
    pub source: String,
    /// Position of the line within its source (byte offset for files).
    pub offset: i64,
}

/// A raw event enriched with host identity and a derived timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub raw: String,
    pub host: String,
    pub source: String,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
}

/// A persisted event together with its store-assigned identity.
///
/// Identities increase in insertion order and are never reused; they break
/// ties between events sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventWithId {
    pub id: i64,
    pub raw: String,
    pub host: String,
    pub source: String,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
}

/// The caller-visible search result.
///
/// `fields` always contains a `source` entry equal to [`Self::source`],
/// overwriting any extracted field that happens to be named `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventWithExtractedFields {
    pub id: i64,
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub fields: BTreeMap<String, String>,
}
