//! Coarse full-text match expressions.
//!
//! Fragment filters are turned into a small boolean tree of phrase terms and
//! only then rendered to SQLite FTS5 syntax by [`MatchExpr::to_fts5`]. User
//! text never reaches the index query except as quoted, tokenized phrases,
//! and the rendered string is bound as a single SQL parameter.
//!
//! The match is deliberately approximate. Each phrase matches its last token
//! as a prefix, so `"disk ful"` still finds `disk full`. Text after a `*`
//! inside a word only constrains from its second token on. Results are
//! always refined afterwards by [`crate::filter::CompiledSearch`].

/// FTS column holding the raw event text.
pub const RAW_COLUMN: &str = "raw";

/// Boolean tree over phrase terms of the raw text column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchExpr {
    /// Consecutive index tokens; the last one matches as a prefix.
    Phrase(Vec<String>),
    And(Vec<MatchExpr>),
    Or(Vec<MatchExpr>),
}

/// Split text into lower-cased index tokens the way the FTS5 `unicode61`
/// tokenizer does: runs of alphanumeric characters.
pub fn index_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl MatchExpr {
    /// Build the coarse expression for one fragment.
    ///
    /// Wildcards split the fragment into pieces that must all appear. A
    /// piece that follows a `*` and starts with a word character may begin
    /// mid-token, so its first token is dropped. Returns `None` when nothing
    /// in the fragment is indexable, meaning the index cannot narrow the
    /// search at all.
    pub fn for_fragment(fragment: &str) -> Option<Self> {
        let mut pieces: Vec<MatchExpr> = fragment
            .split('*')
            .enumerate()
            .map(|(i, piece)| {
                let mut tokens = index_tokens(piece);
                let mid_word = piece.chars().next().is_some_and(char::is_alphanumeric);
                if i > 0 && mid_word && !tokens.is_empty() {
                    tokens.remove(0);
                }
                tokens
            })
            .filter(|tokens| !tokens.is_empty())
            .map(MatchExpr::Phrase)
            .collect();
        match pieces.len() {
            0 => None,
            1 => pieces.pop(),
            _ => Some(MatchExpr::And(pieces)),
        }
    }

    /// Build the coarse expression matching any of `fragments`.
    ///
    /// A single unindexable fragment makes the whole alternative
    /// unconstrained, so `None` is returned.
    pub fn any_fragment<'a, I>(fragments: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut alternatives = Vec::new();
        for fragment in fragments {
            alternatives.push(Self::for_fragment(fragment)?);
        }
        match alternatives.len() {
            0 => None,
            1 => alternatives.pop(),
            _ => Some(MatchExpr::Or(alternatives)),
        }
    }

    /// Render as an FTS5 query string.
    pub fn to_fts5(&self) -> String {
        match self {
            MatchExpr::Phrase(tokens) => {
                format!("{} : {} *", RAW_COLUMN, quote(&tokens.join(" ")))
            }
            MatchExpr::And(children) => join(children, " AND "),
            MatchExpr::Or(children) => join(children, " OR "),
        }
    }

    /// Evaluate against raw text with the same semantics the index applies.
    pub fn matches(&self, raw: &str) -> bool {
        self.matches_tokens(&index_tokens(raw))
    }

    fn matches_tokens(&self, haystack: &[String]) -> bool {
        match self {
            MatchExpr::Phrase(phrase) => phrase_matches(haystack, phrase),
            MatchExpr::And(children) => children.iter().all(|c| c.matches_tokens(haystack)),
            MatchExpr::Or(children) => children.iter().any(|c| c.matches_tokens(haystack)),
        }
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn join(children: &[MatchExpr], separator: &str) -> String {
    children
        .iter()
        .map(|c| format!("({})", c.to_fts5()))
        .collect::<Vec<_>>()
        .join(separator)
}

fn phrase_matches(haystack: &[String], phrase: &[String]) -> bool {
    let Some((last, head)) = phrase.split_last() else {
        return true;
    };
    haystack.windows(phrase.len()).any(|window| {
        window[..head.len()] == *head && window[head.len()].starts_with(last.as_str())
    })
}
