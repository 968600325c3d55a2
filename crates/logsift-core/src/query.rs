//! Query string parsing.
//!
//! A query is a whitespace-separated conjunction of terms:
//!
//! | Term | Meaning |
//! |------|---------|
//! | `word`, `"a phrase"` | the raw line must contain it |
//! | `key=value` | field `key` must equal one of its listed values |
//! | `key!=value` | field `key` must not equal `value` |
//! | `source=name` | only events from `name` (repeatable) |
//! | `NOT <term>` | negates the following term |
//!
//! `*` acts as a wildcard inside fragments and values. Keys and values are
//! kept exactly as written; case folding happens at match time.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::ParseError;

/// Field name that routes a constraint to the source sets.
pub const SOURCE_FIELD: &str = "source";

/// A parsed, immutable search filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Search {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub fragments: BTreeSet<String>,
    pub not_fragments: BTreeSet<String>,
    /// Accepted values per field: OR within a field, AND across fields.
    pub fields: BTreeMap<String, Vec<String>>,
    pub not_fields: BTreeMap<String, Vec<String>>,
    pub sources: BTreeSet<String>,
    pub not_sources: BTreeSet<String>,
}

impl Search {
    /// Parse `query` into a filter bounded by the optional time range.
    pub fn parse(
        query: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Self, ParseError> {
        let mut search = Search {
            start_time,
            end_time,
            ..Default::default()
        };

        let mut tokens = tokenize(query)?.into_iter().peekable();
        while let Some(mut token) = tokens.next() {
            let mut negated = false;
            while matches!(&token.kind, TokenKind::Word(w) if w == "NOT") {
                negated = !negated;
                token = match tokens.next() {
                    Some(next) => next,
                    None => {
                        return Err(ParseError::new(
                            token.position,
                            "NOT must be followed by a term",
                        ))
                    }
                };
            }

            let (text, quoted) = match token.kind {
                TokenKind::Word(w) => (w, false),
                TokenKind::Quoted(q) => (q, true),
                TokenKind::Eq | TokenKind::NotEq => {
                    return Err(ParseError::new(
                        token.position,
                        "expected a field name before the operator",
                    ))
                }
            };

            let op = tokens.next_if(|t| matches!(t.kind, TokenKind::Eq | TokenKind::NotEq));
            let Some(op) = op else {
                if text.is_empty() {
                    return Err(ParseError::new(token.position, "empty quoted fragment"));
                }
                search.add_fragment(text, negated);
                continue;
            };

            if quoted {
                return Err(ParseError::new(
                    token.position,
                    "field names cannot be quoted",
                ));
            }
            let value = match tokens.next() {
                Some(Token {
                    kind: TokenKind::Word(v) | TokenKind::Quoted(v),
                    ..
                }) => v,
                Some(other) => {
                    return Err(ParseError::new(
                        other.position,
                        format!("expected a value for field '{}'", text),
                    ))
                }
                None => {
                    return Err(ParseError::new(
                        op.position,
                        format!("expected a value for field '{}'", text),
                    ))
                }
            };
            if value.is_empty() {
                return Err(ParseError::new(
                    op.position,
                    format!("empty value for field '{}'", text),
                ));
            }

            let negated = negated ^ (op.kind == TokenKind::NotEq);
            search.add_field(text, value, negated);
        }

        Ok(search)
    }

    fn add_fragment(&mut self, fragment: String, negated: bool) {
        if negated {
            self.not_fragments.insert(fragment);
        } else {
            self.fragments.insert(fragment);
        }
    }

    fn add_field(&mut self, key: String, value: String, negated: bool) {
        if key == SOURCE_FIELD {
            if negated {
                self.not_sources.insert(value);
            } else {
                self.sources.insert(value);
            }
            return;
        }

        let map = if negated {
            &mut self.not_fields
        } else {
            &mut self.fields
        };
        let values = map.entry(key).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Quoted(String),
    Eq,
    NotEq,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let is_not_eq = |i: usize| chars[i] == '!' && chars.get(i + 1) == Some(&'=');

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            let start = i;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(ParseError::new(start, "unterminated quoted string")),
                    Some('\\') if matches!(chars.get(i + 1), Some('"' | '\\')) => {
                        text.push(chars[i + 1]);
                        i += 2;
                    }
                    Some('"') => {
                        i += 1;
                        break;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::Quoted(text),
                position: start,
            });
        } else if c == '=' {
            tokens.push(Token {
                kind: TokenKind::Eq,
                position: i,
            });
            i += 1;
        } else if is_not_eq(i) {
            tokens.push(Token {
                kind: TokenKind::NotEq,
                position: i,
            });
            i += 2;
        } else {
            let start = i;
            let mut word = String::new();
            while i < chars.len()
                && !chars[i].is_whitespace()
                && chars[i] != '"'
                && chars[i] != '='
                && !is_not_eq(i)
            {
                word.push(chars[i]);
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Word(word),
                position: start,
            });
        }
    }
    Ok(tokens)
}
