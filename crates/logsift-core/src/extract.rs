//! Field extraction from raw log lines.
//!
//! Every rule is a regular expression applied to the (already lower-cased)
//! raw line; each match contributes field assignments:
//!
//! - named capture groups assign `name -> captured text`, so a rule like
//!   `^(?P<_time>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})` yields `_time`;
//! - a rule with exactly two unnamed groups assigns `group1 -> group2`,
//!   the classic `(\w+)=(\w+)` key/value extractor.
//!
//! Later assignments overwrite earlier ones.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::CompileError;

/// Reserved field holding the textual event timestamp.
pub const TIME_FIELD: &str = "_time";

/// A compiled, ordered set of extraction rules.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    rules: Vec<Regex>,
}

impl FieldExtractor {
    /// Compile each pattern into a rule, failing on the first bad one.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| CompileError {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Regex] {
        &self.rules
    }

    /// Extract all fields from `lowered_raw`.
    ///
    /// The caller lower-cases the raw line; this function does not.
    pub fn extract(&self, lowered_raw: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for rule in &self.rules {
            let has_named = rule.capture_names().flatten().next().is_some();
            let key_value = !has_named && rule.captures_len() == 3;

            for caps in rule.captures_iter(lowered_raw) {
                if has_named {
                    for name in rule.capture_names().flatten() {
                        if let Some(m) = caps.name(name) {
                            fields.insert(name.to_string(), m.as_str().to_string());
                        }
                    }
                } else if key_value {
                    if let (Some(k), Some(v)) = (caps.get(1), caps.get(2)) {
                        fields.insert(k.as_str().to_string(), v.as_str().to_string());
                    }
                }
            }
        }
        fields
    }
}
