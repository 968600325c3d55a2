//! Errors surfaced synchronously to the caller of a search, before any
//! streaming starts.

use thiserror::Error;

/// The query string could not be turned into a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    /// Character offset into the query string where the problem was found.
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// A fragment or field value could not be compiled into a matcher.
#[derive(Debug, Error)]
#[error("failed to compile pattern '{pattern}': {source}")]
pub struct CompileError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Any error that stops a search before its first page is produced.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
