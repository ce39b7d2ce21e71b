//! Query language: a lenient field-aware parser producing engine
//! queries, plus the revision-window filter applied around them.

mod gap_phrase;
mod lexer;
mod parser;
mod revision_filter;

pub use gap_phrase::{parse_to_string, GapPhraseParser, Phrase};
pub use lexer::{Lexer, Token};
pub use parser::QueryParser;
pub use revision_filter::RevisionRangeFilter;

use std::fmt;

use crate::engine::EngineReader;

const MAX_WILDCARD_MATCHES: usize = 1000;

#[derive(Debug)]
pub enum QueryError {
    /// A wildcard expanded past the match cap.
    TooManyMatches,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::TooManyMatches => {
                write!(f, "too many matches for wildcard query, please be more specific")
            }
        }
    }
}

impl std::error::Error for QueryError {}

pub(crate) fn is_wildcard(term: &str) -> bool {
    term.contains('*') || term.contains('?')
}

/// Expand a wildcard pattern against the field's term dictionary via
/// an ordered scan from the pattern's literal prefix.
pub(crate) fn expand_wildcard(
    reader: &EngineReader,
    field: &str,
    pattern: &str,
) -> Result<Vec<String>, QueryError> {
    let prefix: String = pattern.chars().take_while(|c| *c != '*' && *c != '?').collect();
    let Some(matcher) = wildcard_regex(pattern) else {
        return Ok(Vec::new());
    };
    let mut matches = Vec::new();
    for (term, _) in reader.segment().terms_from(field, &prefix) {
        if !term.starts_with(&prefix) {
            break;
        }
        if matcher.is_match(term) {
            if matches.len() >= MAX_WILDCARD_MATCHES {
                return Err(QueryError::TooManyMatches);
            }
            matches.push(term.to_string());
        }
    }
    Ok(matches)
}

fn wildcard_regex(pattern: &str) -> Option<regex::Regex> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    regex::Regex::new(&source).ok()
}
