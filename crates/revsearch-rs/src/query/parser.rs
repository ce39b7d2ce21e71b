use std::iter::Peekable;
use std::sync::OnceLock;

use regex::Regex;

use crate::analysis::{ContentTokens, ExternalsTokens, PathTokens};
use crate::engine::query::{EngineQuery, Occur, SpanQuery};
use crate::engine::EngineReader;
use crate::types::field;

use super::gap_phrase::{GapPhraseParser, Phrase};
use super::lexer::{Lexer, Token};
use super::{expand_wildcard, is_wildcard, QueryError};

/// Bare terms that look like paths go to the path field instead of
/// content: absolute or trailing slashes, dots, wildcard extensions.
fn path_hint() -> Option<&'static Regex> {
    static HINT: OnceLock<Option<Regex>> = OnceLock::new();
    HINT.get_or_init(|| Regex::new(r"(^/|\.)|(/$)|(\*\.)|(\.\*)|(/\*\*/)").ok())
        .as_ref()
}

/// Lenient recursive-descent parser over lexer tokens. Malformed
/// input never errors; unclosed groups end at the input, stray tokens
/// are dropped. The only hard failure is a wildcard expanding past
/// the match cap.
pub struct QueryParser<'a> {
    reader: &'a EngineReader,
}

impl<'a> QueryParser<'a> {
    pub fn new(reader: &'a EngineReader) -> Self {
        QueryParser { reader }
    }

    pub fn parse(&self, input: &str) -> Result<EngineQuery, QueryError> {
        let mut tokens = Lexer::tokens(input).into_iter().peekable();
        self.parse_group(&mut tokens, None)
    }

    fn parse_group(
        &self,
        tokens: &mut Peekable<std::vec::IntoIter<Token>>,
        outer_field: Option<&str>,
    ) -> Result<EngineQuery, QueryError> {
        let mut clauses = Vec::new();
        let mut occur = Occur::Must;
        let mut field_parts: Vec<String> = Vec::new();
        while let Some(token) = tokens.next() {
            match token {
                Token::Operator(op) => occur = op,
                Token::Left => {
                    let joined;
                    let group_field = if field_parts.is_empty() {
                        outer_field
                    } else {
                        joined = field_parts.join(":");
                        Some(joined.as_str())
                    };
                    let sub = self.parse_group(tokens, group_field)?;
                    if !matches!(&sub, EngineQuery::Boolean { clauses, .. } if clauses.is_empty()) {
                        clauses.push((occur, sub));
                    }
                    occur = Occur::Must;
                    field_parts.clear();
                }
                Token::Right => break,
                Token::Field(name) => field_parts.push(name),
                Token::Term(text) => {
                    let joined;
                    let term_field = if field_parts.is_empty() {
                        outer_field
                    } else {
                        joined = field_parts.join(":");
                        Some(joined.as_str())
                    };
                    if let Some(q) = self.parse_term(term_field, &text)? {
                        clauses.push((occur, q));
                    }
                    occur = Occur::Must;
                    field_parts.clear();
                }
            }
        }
        Ok(EngineQuery::Boolean {
            clauses,
            min_should: 0,
        })
    }

    fn parse_term(&self, field: Option<&str>, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        match field {
            None | Some("_") | Some("") => {
                if path_hint().is_some_and(|hint| hint.is_match(text)) {
                    return self.path_query(text);
                }
                // A plain word could be either a path component or
                // content; try both.
                let mut clauses = Vec::new();
                if let Some(q) = self.path_query(text)? {
                    clauses.push((Occur::Should, q));
                }
                if let Some(q) = self.phrase_query(field::CONTENT, text)? {
                    clauses.push((Occur::Should, q));
                }
                match clauses.len() {
                    0 => Ok(None),
                    1 => Ok(clauses.pop().map(|(_, q)| q)),
                    _ => Ok(Some(EngineQuery::Boolean {
                        clauses,
                        min_should: 1,
                    })),
                }
            }
            Some("a") | Some("author") => self.author_query(text),
            Some("c") | Some("content") => self.phrase_query(field::CONTENT, text),
            Some("m") | Some("message") => self.phrase_query(field::MESSAGE, text),
            Some("p") | Some("path") => self.path_query(text),
            Some("e") | Some("x") | Some("externals") => self.externals_query(text),
            Some("t") | Some("type") | Some("mime-type") => self.type_query(text),
            // Anything else addresses a raw property field.
            Some(property) => self.phrase_query(property, text),
        }
    }

    fn author_query(&self, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        let term = text.to_lowercase();
        if !is_wildcard(&term) {
            return Ok(Some(EngineQuery::term(field::AUTHOR, term)));
        }
        let matches = self.expand(field::AUTHOR, &term)?;
        Ok(Some(EngineQuery::Boolean {
            clauses: matches
                .into_iter()
                .map(|t| (Occur::Should, EngineQuery::term(field::AUTHOR, t)))
                .collect(),
            min_should: 0,
        }))
    }

    fn type_query(&self, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        let term = text.to_lowercase();
        if !is_wildcard(&term) {
            return Ok(Some(EngineQuery::term(field::TYPE, term)));
        }
        let matches = self.expand(field::TYPE, &term)?;
        Ok(Some(EngineQuery::Boolean {
            clauses: matches
                .into_iter()
                .map(|t| (Occur::Should, EngineQuery::term(field::TYPE, t)))
                .collect(),
            min_should: 0,
        }))
    }

    fn phrase_query(&self, field: &str, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        let tokens: Vec<String> = ContentTokens::with_wildcards(text).collect();
        let Some(phrase) = GapPhraseParser::new(tokens).parse() else {
            return Ok(None);
        };
        let span = self.build_span(field, &phrase, false)?;
        Ok(Some(EngineQuery::Span(span)))
    }

    fn path_query(&self, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        let tokens: Vec<String> = PathTokens::new(text).collect();
        let Some(phrase) = GapPhraseParser::new(tokens).parse() else {
            return Ok(None);
        };
        let span = self.build_span(field::PATH, &phrase, true)?;
        Ok(Some(EngineQuery::Span(span)))
    }

    fn externals_query(&self, text: &str) -> Result<Option<EngineQuery>, QueryError> {
        let tokens: Vec<String> = ExternalsTokens::new(text)
            .filter(|t| t != crate::analysis::EXTERNALS_EOL)
            .collect();
        let Some(phrase) = GapPhraseParser::new(tokens).parse() else {
            return Ok(None);
        };
        let inner = self.build_span(field::EXTERNALS, &phrase, false)?;
        let anchored = SpanQuery::Near {
            clauses: vec![
                SpanQuery::term(field::EXTERNALS, crate::analysis::EXTERNALS_EOL),
                inner.clone(),
            ],
            slop: 0,
        };
        if text.trim_start().starts_with(['/', '\\']) {
            return Ok(Some(EngineQuery::Span(anchored)));
        }
        Ok(Some(EngineQuery::Boolean {
            clauses: vec![
                (Occur::Should, EngineQuery::Span(anchored)),
                (Occur::Should, EngineQuery::Span(inner)),
            ],
            min_should: 0,
        }))
    }

    fn build_span(&self, field: &str, phrase: &Phrase, path: bool) -> Result<SpanQuery, QueryError> {
        self.build_span_inner(field, phrase, path, path, path)
    }

    fn build_span_inner(
        &self,
        field: &str,
        phrase: &Phrase,
        path: bool,
        first: bool,
        last: bool,
    ) -> Result<SpanQuery, QueryError> {
        match phrase {
            Phrase::Term(term) => {
                if path {
                    self.leaf_variants(field, term, first, last)
                } else {
                    self.term_span(field, term)
                }
            }
            Phrase::Gap { gap, children } => {
                let end = children.len().saturating_sub(1);
                let mut spans = Vec::with_capacity(children.len());
                for (i, child) in children.iter().enumerate() {
                    spans.push(self.build_span_inner(
                        field,
                        child,
                        path,
                        first && i == 0,
                        last && i == end,
                    )?);
                }
                if *gap > 0 && spans.len() >= 2 {
                    desugar_subsets(&mut spans);
                }
                let slop = gap.saturating_mul(spans.len() as u32 - 1);
                Ok(SpanQuery::Near { clauses: spans, slop })
            }
        }
    }

    fn term_span(&self, field: &str, term: &str) -> Result<SpanQuery, QueryError> {
        if !is_wildcard(term) {
            return Ok(SpanQuery::term(field, term));
        }
        let matches = self.expand(field, term)?;
        Ok(match matches.len() {
            // A term the index has never seen matches nothing.
            0 => SpanQuery::term(field, ":"),
            1 => SpanQuery::term(field, matches.into_iter().next().unwrap_or_default()),
            _ => SpanQuery::Or(matches.into_iter().map(|t| SpanQuery::term(field, t)).collect()),
        })
    }

    /// A path token on a phrase boundary could sit next to a marker
    /// the query left out: the first term may follow a dot, the last
    /// may end a directory component.
    fn leaf_variants(
        &self,
        field: &str,
        term: &str,
        first: bool,
        last: bool,
    ) -> Result<SpanQuery, QueryError> {
        if matches!(term, "/" | ":" | "^") {
            return self.term_span(field, term);
        }
        let mut variants = vec![term.to_string()];
        if last && !term.ends_with('/') {
            variants.push(format!("{term}/"));
        }
        if first && !term.starts_with('.') {
            variants.push(format!(".{term}"));
            if last && !term.ends_with('/') {
                variants.push(format!(".{term}/"));
            }
        }
        let mut spans = Vec::new();
        for variant in variants {
            match self.term_span(field, &variant)? {
                SpanQuery::Term { term, .. } if term == ":" => {}
                span => spans.push(span),
            }
        }
        Ok(match spans.len() {
            0 => SpanQuery::term(field, ":"),
            1 => spans.into_iter().next().unwrap_or(SpanQuery::term(field, ":")),
            _ => SpanQuery::Or(spans),
        })
    }

    fn expand(&self, field: &str, pattern: &str) -> Result<Vec<String>, QueryError> {
        if pattern.chars().all(|c| c == '*' || c == '?') {
            return Err(QueryError::TooManyMatches);
        }
        expand_wildcard(self.reader, field, pattern)
    }
}

/// When one side of a positive gap repeats all terms of its neighbor,
/// a plain proximity match would accept the neighbor's own occurrence
/// standing in for it. Exclude spans overlapping the wider side.
fn desugar_subsets(spans: &mut [SpanQuery]) {
    for i in 0..spans.len() - 1 {
        let left_terms = spans[i].terms();
        let right_terms = spans[i + 1].terms();
        if right_terms.is_subset(&left_terms) {
            spans[i + 1] = SpanQuery::Not {
                include: Box::new(spans[i + 1].clone()),
                exclude: Box::new(spans[i].clone()),
            };
        } else if left_terms.is_subset(&right_terms) {
            spans[i] = SpanQuery::Not {
                include: Box::new(spans[i].clone()),
                exclude: Box::new(spans[i + 1].clone()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::execute;
    use crate::engine::{Document, Engine, EngineWriter};
    use crate::analysis::{ContentTokens as CT, PathTokens as PT};

    fn sample_reader() -> EngineReader {
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        let docs = [
            ("/src/fileio.cpp", "open close read write elephant"),
            ("/src/main.cpp", "int main return elephant Elefant"),
            ("/doc/readme.txt", "read me first elefant"),
        ];
        for (path, content) in docs {
            let mut doc = Document::new(format!("{path}@00000001"));
            doc.index_keyword(field::ID, format!("{path}@00000001"));
            doc.index_tokens(field::PATH, PT::new(path));
            doc.index_tokens(field::CONTENT, CT::new(content));
            doc.index_keyword(field::AUTHOR, "alice");
            doc.index_keyword(field::TYPE, "text/plain");
            writer.add(doc);
        }
        writer.commit().unwrap();
        engine.reader()
    }

    fn run(reader: &EngineReader, input: &str) -> Vec<u32> {
        let query = QueryParser::new(reader).parse(input).unwrap();
        execute(reader, &query, None)
    }

    #[test]
    fn bare_terms_use_the_path_hint() {
        let reader = sample_reader();
        assert_eq!(run(&reader, "elephant"), vec![0, 1]);
        assert_eq!(run(&reader, "*.cpp"), vec![0, 1]);
        assert_eq!(run(&reader, "/doc/"), vec![2]);
    }

    #[test]
    fn bare_terms_try_path_and_content_together() {
        let reader = sample_reader();
        // README is a path component only; RETURN is content only.
        assert_eq!(run(&reader, "readme"), vec![2]);
        assert_eq!(run(&reader, "return"), vec![1]);
    }

    #[test]
    fn path_phrases_anchor_dot_variants_at_the_first_term() {
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        for path in ["/src/x.fileio.cpp", "/src/fileio.cpp", "/lib/other.cpp"] {
            let mut doc = Document::new(format!("{path}@00000001"));
            doc.index_keyword(field::ID, format!("{path}@00000001"));
            doc.index_tokens(field::PATH, PT::new(path));
            writer.add(doc);
        }
        writer.commit().unwrap();
        let reader = engine.reader();
        // fileio may start a name or follow a dot, but cpp must end it.
        assert_eq!(run(&reader, "p:fileio.cpp"), vec![0, 1]);
        assert_eq!(run(&reader, "p:x.fileio"), vec![0]);
    }

    #[test]
    fn wildcards_fold_case_through_the_dictionary() {
        let reader = sample_reader();
        // Content terms are uppercased at index time, so El*ant
        // reaches ELEPHANT and ELEFANT alike.
        assert_eq!(run(&reader, "c:El*ant"), vec![0, 1, 2]);
    }

    #[test]
    fn unknown_wildcards_match_nothing() {
        let reader = sample_reader();
        assert_eq!(run(&reader, "c:zz*"), Vec::<u32>::new());
    }

    #[test]
    fn pure_wildcard_is_rejected() {
        let reader = sample_reader();
        assert!(matches!(
            QueryParser::new(&reader).parse("c:??"),
            Err(QueryError::TooManyMatches)
        ));
    }

    #[test]
    fn operators_compose() {
        let reader = sample_reader();
        assert_eq!(run(&reader, "c:read -c:elephant"), vec![2]);
        assert_eq!(run(&reader, "#c:first #c:main"), vec![1, 2]);
    }

    #[test]
    fn field_aliases_resolve() {
        let reader = sample_reader();
        assert_eq!(run(&reader, "a:Alice"), vec![0, 1, 2]);
        assert_eq!(run(&reader, "t:text*"), vec![0, 1, 2]);
        assert_eq!(run(&reader, "p:fileio.cpp"), vec![0]);
    }

    #[test]
    fn grouped_field_applies_to_terms() {
        let reader = sample_reader();
        assert_eq!(run(&reader, "c:(read write)"), vec![0]);
    }

    #[test]
    fn repeated_subset_neighbors_are_desugared() {
        // "cc dd ** dd cc": the trailing "dd cc" must be a different
        // occurrence than the leading "cc dd".
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        for (i, text) in ["cc dd ee ff ee dd cc", "cc dd cc", "cc dd"].iter().enumerate() {
            let mut doc = Document::new(format!("d{i}"));
            doc.index_tokens(field::CONTENT, CT::new(text));
            writer.add(doc);
        }
        writer.commit().unwrap();
        let reader = engine.reader();
        assert_eq!(run(&reader, "c:\"(cc dd) ** (dd cc)\""), vec![0]);
    }
}
