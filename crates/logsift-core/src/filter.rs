//! Matcher compilation and exact refinement of coarse store results.
//!
//! The store's full-text index only approximates a [`Search`]; every event it
//! returns is re-checked here against compiled, case-insensitive patterns.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};

use crate::error::CompileError;
use crate::extract::FieldExtractor;
use crate::models::{EventWithExtractedFields, EventWithId};
use crate::query::{Search, SOURCE_FIELD};

const WILDCARD: char = '*';

fn wildcard_pattern(input: &str) -> String {
    input
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

fn build(pattern: String, source: &str) -> Result<Regex, CompileError> {
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source_err| CompileError {
            pattern: source.to_string(),
            source: source_err,
        })
}

/// Compile a fragment into an unanchored substring matcher.
pub fn compile_fragment(fragment: &str) -> Result<Regex, CompileError> {
    build(wildcard_pattern(fragment), fragment)
}

/// Compile a field value into a matcher anchored to the whole value.
pub fn compile_value(value: &str) -> Result<Regex, CompileError> {
    build(format!("^(?:{})$", wildcard_pattern(value)), value)
}

/// Compile a set of fragments.
pub fn compile_keys(keys: &BTreeSet<String>) -> Result<Vec<Regex>, CompileError> {
    keys.iter().map(|k| compile_fragment(k)).collect()
}

/// Compile every accepted (or forbidden) value of every field.
pub fn compile_map(
    map: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<Regex>>, CompileError> {
    map.iter()
        .map(|(field, values)| {
            let compiled = values
                .iter()
                .map(|v| compile_value(v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, CompileError>((field.clone(), compiled))
        })
        .collect()
}

/// All matchers of one search, compiled once before streaming starts.
#[derive(Debug, Clone)]
pub struct CompiledSearch {
    fragments: Vec<Regex>,
    not_fragments: Vec<Regex>,
    fields: BTreeMap<String, Vec<Regex>>,
    not_fields: BTreeMap<String, Vec<Regex>>,
}

impl CompiledSearch {
    pub fn compile(search: &Search) -> Result<Self, CompileError> {
        Ok(Self {
            fragments: compile_keys(&search.fragments)?,
            not_fragments: compile_keys(&search.not_fragments)?,
            fields: compile_map(&search.fields)?,
            not_fields: compile_map(&search.not_fields)?,
        })
    }

    /// Re-check a coarse match, returning the caller-visible event when it
    /// satisfies every constraint.
    ///
    /// Fields are extracted from the lower-cased raw line and `source` is
    /// then forced to the event's source.
    pub fn refine(
        &self,
        event: &EventWithId,
        extractor: &FieldExtractor,
    ) -> Option<EventWithExtractedFields> {
        let raw_lowered = event.raw.to_lowercase();
        let mut fields = extractor.extract(&raw_lowered);
        fields.insert(SOURCE_FIELD.to_string(), event.source.clone());

        if !self.matches(&raw_lowered, &fields) {
            return None;
        }

        Some(EventWithExtractedFields {
            id: event.id,
            raw: event.raw.clone(),
            timestamp: event.timestamp,
            source: event.source.clone(),
            fields,
        })
    }

    fn matches(&self, raw_lowered: &str, fields: &BTreeMap<String, String>) -> bool {
        if !self.fragments.iter().all(|f| f.is_match(raw_lowered)) {
            return false;
        }
        if self.not_fragments.iter().any(|f| f.is_match(raw_lowered)) {
            return false;
        }

        for (key, accepted) in &self.fields {
            match fields.get(key) {
                Some(value) if accepted.iter().any(|p| p.is_match(value)) => {}
                _ => return false,
            }
        }

        // An absent field ends the forbidden-field checks without rejecting
        // the event, including for the constraints that follow it.
        for (key, forbidden) in &self.not_fields {
            let Some(value) = fields.get(key) else {
                break;
            };
            if forbidden.iter().any(|p| p.is_match(value)) {
                return false;
            }
        }

        true
    }
}
