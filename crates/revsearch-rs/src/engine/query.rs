//! Query tree and evaluation over a committed segment.

use std::collections::BTreeSet;

use super::{EngineReader, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineQuery {
    /// Exact term in a field.
    Term { field: String, term: String },
    Boolean {
        clauses: Vec<(Occur, EngineQuery)>,
        min_should: usize,
    },
    Span(SpanQuery),
}

/// Positional queries. A span is a half-open token range [start, end)
/// within one document and field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanQuery {
    Term { field: String, term: String },
    /// Ordered proximity: clause spans in order, total gap <= `slop`.
    Near { clauses: Vec<SpanQuery>, slop: u32 },
    Or(Vec<SpanQuery>),
    /// Spans of `include` that do not overlap any span of `exclude`.
    Not {
        include: Box<SpanQuery>,
        exclude: Box<SpanQuery>,
    },
}

impl EngineQuery {
    pub fn term(field: &str, term: impl Into<String>) -> EngineQuery {
        EngineQuery::Term {
            field: field.to_string(),
            term: term.into(),
        }
    }
}

impl SpanQuery {
    pub fn term(field: &str, term: impl Into<String>) -> SpanQuery {
        SpanQuery::Term {
            field: field.to_string(),
            term: term.into(),
        }
    }

    /// Every term mentioned anywhere in this span tree.
    pub fn terms(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            SpanQuery::Term { term, .. } => {
                out.insert(term.as_str());
            }
            SpanQuery::Near { clauses, .. } => {
                for c in clauses {
                    c.collect_terms(out);
                }
            }
            SpanQuery::Or(clauses) => {
                for c in clauses {
                    c.collect_terms(out);
                }
            }
            SpanQuery::Not { include, .. } => include.collect_terms(out),
        }
    }
}

/// Evaluate a query, returning matching live doc numbers in order.
/// `filter`, when present, is indexed by doc number; `false` drops the
/// doc from the result.
pub fn execute(reader: &EngineReader, query: &EngineQuery, filter: Option<&[bool]>) -> Vec<u32> {
    let segment = reader.segment();
    let mut docs: Vec<u32> = matching_docs(segment, query)
        .into_iter()
        .filter(|&d| segment.is_alive(d))
        .collect();
    if let Some(bits) = filter {
        docs.retain(|&d| bits.get(d as usize).copied().unwrap_or(false));
    }
    docs
}

fn matching_docs(segment: &Segment, query: &EngineQuery) -> BTreeSet<u32> {
    match query {
        EngineQuery::Term { field, term } => term_docs(segment, field, term),
        EngineQuery::Boolean { clauses, min_should } => {
            let mut musts: Option<BTreeSet<u32>> = None;
            let mut nots = BTreeSet::new();
            let mut should_sets = Vec::new();
            for (occur, clause) in clauses {
                let set = matching_docs(segment, clause);
                match occur {
                    Occur::Must => {
                        musts = Some(match musts {
                            None => set,
                            Some(prev) => prev.intersection(&set).copied().collect(),
                        });
                    }
                    Occur::MustNot => nots.extend(set),
                    Occur::Should => should_sets.push(set),
                }
            }
            // With no musts at least one should has to match.
            let needed = if musts.is_none() {
                (*min_should).max(1)
            } else {
                *min_should
            };
            let candidates: BTreeSet<u32> = match &musts {
                Some(set) => set.clone(),
                None => should_sets.iter().flatten().copied().collect(),
            };
            candidates
                .into_iter()
                .filter(|d| !nots.contains(d))
                .filter(|d| {
                    should_sets.iter().filter(|s| s.contains(d)).count() >= needed
                })
                .collect()
        }
        EngineQuery::Span(span) => candidate_docs(segment, span)
            .into_iter()
            .filter(|&d| !spans_in_doc(segment, span, d).is_empty())
            .collect(),
    }
}

fn term_docs(segment: &Segment, field: &str, term: &str) -> BTreeSet<u32> {
    segment.postings(field, term).iter().map(|p| p.doc).collect()
}

/// Docs that could possibly produce a span; exact span checks run per
/// candidate afterwards.
fn candidate_docs(segment: &Segment, span: &SpanQuery) -> BTreeSet<u32> {
    match span {
        SpanQuery::Term { field, term } => term_docs(segment, field, term),
        SpanQuery::Near { clauses, .. } => {
            let mut sets = clauses.iter().map(|c| candidate_docs(segment, c));
            let mut acc = match sets.next() {
                Some(s) => s,
                None => return BTreeSet::new(),
            };
            for set in sets {
                acc = acc.intersection(&set).copied().collect();
            }
            acc
        }
        SpanQuery::Or(clauses) => clauses
            .iter()
            .flat_map(|c| candidate_docs(segment, c))
            .collect(),
        SpanQuery::Not { include, .. } => candidate_docs(segment, include),
    }
}

fn spans_in_doc(segment: &Segment, span: &SpanQuery, doc: u32) -> Vec<(u32, u32)> {
    match span {
        SpanQuery::Term { field, term } => segment
            .postings(field, term)
            .iter()
            .find(|p| p.doc == doc)
            .map(|p| p.positions.iter().map(|&pos| (pos, pos + 1)).collect())
            .unwrap_or_default(),
        SpanQuery::Near { clauses, slop } => {
            let lists: Vec<Vec<(u32, u32)>> = clauses
                .iter()
                .map(|c| spans_in_doc(segment, c, doc))
                .collect();
            if lists.iter().any(Vec::is_empty) {
                return Vec::new();
            }
            // (start, end, gap used so far)
            let mut acc: Vec<(u32, u32, u32)> =
                lists[0].iter().map(|&(s, e)| (s, e, 0)).collect();
            for list in &lists[1..] {
                let mut next = Vec::new();
                for &(s, e, gap) in &acc {
                    for &(ns, ne) in list {
                        if ns >= e && gap + (ns - e) <= *slop {
                            next.push((s, ne, gap + (ns - e)));
                        }
                    }
                }
                acc = next;
                if acc.is_empty() {
                    break;
                }
            }
            let mut spans: Vec<(u32, u32)> = acc.into_iter().map(|(s, e, _)| (s, e)).collect();
            spans.sort_unstable();
            spans.dedup();
            spans
        }
        SpanQuery::Or(clauses) => {
            let mut spans: Vec<(u32, u32)> = clauses
                .iter()
                .flat_map(|c| spans_in_doc(segment, c, doc))
                .collect();
            spans.sort_unstable();
            spans.dedup();
            spans
        }
        SpanQuery::Not { include, exclude } => {
            let excluded = spans_in_doc(segment, exclude, doc);
            spans_in_doc(segment, include, doc)
                .into_iter()
                .filter(|&(s, e)| !excluded.iter().any(|&(xs, xe)| s < xe && xs < e))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Document, Engine, EngineWriter};

    fn index_contents(texts: &[&str]) -> EngineReader {
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        for (i, text) in texts.iter().enumerate() {
            let mut doc = Document::new(format!("doc{i}"));
            doc.index_tokens("content", text.split(' ').map(str::to_string));
            writer.add(doc);
        }
        writer.commit().unwrap();
        engine.reader()
    }

    fn span_near(terms: &[&str], slop: u32) -> EngineQuery {
        EngineQuery::Span(SpanQuery::Near {
            clauses: terms.iter().map(|t| SpanQuery::term("content", *t)).collect(),
            slop,
        })
    }

    #[test]
    fn boolean_must_and_not() {
        let reader = index_contents(&["aa bb", "aa cc", "bb cc"]);
        let q = EngineQuery::Boolean {
            clauses: vec![
                (Occur::Must, EngineQuery::term("content", "aa")),
                (Occur::MustNot, EngineQuery::term("content", "bb")),
            ],
            min_should: 0,
        };
        assert_eq!(execute(&reader, &q, None), vec![1]);
    }

    #[test]
    fn pure_should_needs_one_match() {
        let reader = index_contents(&["aa", "bb", "cc"]);
        let q = EngineQuery::Boolean {
            clauses: vec![
                (Occur::Should, EngineQuery::term("content", "aa")),
                (Occur::Should, EngineQuery::term("content", "cc")),
            ],
            min_should: 0,
        };
        assert_eq!(execute(&reader, &q, None), vec![0, 2]);
    }

    #[test]
    fn near_is_ordered_with_slop() {
        let reader = index_contents(&["aa bb cc", "cc bb aa", "aa xx bb"]);
        assert_eq!(execute(&reader, &span_near(&["aa", "bb"], 0), None), vec![0]);
        assert_eq!(
            execute(&reader, &span_near(&["aa", "bb"], 1), None),
            vec![0, 2]
        );
        assert!(execute(&reader, &span_near(&["bb", "aa"], 0), None) == vec![1]);
    }

    #[test]
    fn span_not_drops_overlapping_matches() {
        // "cc dd" alone matches both docs; excluding "cc dd ee" keeps
        // only the occurrence not inside the longer phrase.
        let reader = index_contents(&["cc dd ee", "xx cc dd yy"]);
        let include = SpanQuery::Near {
            clauses: vec![SpanQuery::term("content", "cc"), SpanQuery::term("content", "dd")],
            slop: 0,
        };
        let exclude = SpanQuery::Near {
            clauses: vec![
                SpanQuery::term("content", "cc"),
                SpanQuery::term("content", "dd"),
                SpanQuery::term("content", "ee"),
            ],
            slop: 0,
        };
        let q = EngineQuery::Span(SpanQuery::Not {
            include: Box::new(include),
            exclude: Box::new(exclude),
        });
        assert_eq!(execute(&reader, &q, None), vec![1]);
    }

    #[test]
    fn filter_masks_docs() {
        let reader = index_contents(&["aa", "aa"]);
        let q = EngineQuery::term("content", "aa");
        assert_eq!(execute(&reader, &q, Some(&[false, true])), vec![1]);
    }
}
