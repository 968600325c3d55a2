//! # logsift core
//!
//! Runtime-free logic shared by every logsift frontend: the event data
//! model, the query parser, field extraction, matcher compilation and
//! refinement, the full-text match expression builder, and the
//! [`store::EventStore`] abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O.

pub mod error;
pub mod extract;
pub mod filter;
pub mod match_expr;
pub mod models;
pub mod query;
pub mod store;
