use std::fmt;

use crate::analysis::ContentTokens;

/// A phrase with proximity gaps. `*` tokens widen the allowed gap by
/// one position, `**` (or more) means any distance. Smaller gaps bind
/// tighter, so `aa bb ** cc dd` groups as `(aa bb) ** (cc dd)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phrase {
    Term(String),
    Gap { gap: u32, children: Vec<Phrase> },
}

pub const ANY_GAP: u32 = 100;

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phrase::Term(t) => f.write_str(t),
            Phrase::Gap { gap, children } => {
                let sep = match gap {
                    0 => " ".to_string(),
                    g if *g < ANY_GAP => format!(" {}", "* ".repeat(*g as usize)),
                    _ => " ** ".to_string(),
                };
                let joined = children
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(&sep);
                write!(f, "({joined})")
            }
        }
    }
}

/// Precedence-climbing parser over a pre-tokenized phrase. Gap tokens
/// between terms accumulate; leading and trailing gaps are ignored.
pub struct GapPhraseParser {
    tokens: Vec<String>,
    pos: usize,
}

impl GapPhraseParser {
    pub fn new(tokens: Vec<String>) -> Self {
        GapPhraseParser { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Option<Phrase> {
        let first = self.consume_to_term()?;
        Some(self.parse_level(Phrase::Term(first), u32::MAX))
    }

    fn parse_level(&mut self, mut left: Phrase, max_gap: u32) -> Phrase {
        loop {
            let Some(gap) = self.peek_gap() else {
                return left;
            };
            if gap > max_gap {
                return left;
            }
            let Some(term) = self.consume_to_term() else {
                return left;
            };
            let right = if gap == 0 {
                Phrase::Term(term)
            } else {
                self.parse_level(Phrase::Term(term), gap - 1)
            };
            left = match left {
                Phrase::Gap { gap: g, mut children } if g == gap => {
                    children.push(right);
                    Phrase::Gap { gap: g, children }
                }
                other => Phrase::Gap {
                    gap,
                    children: vec![other, right],
                },
            };
        }
    }

    /// Accumulated gap before the next term, or None when only gap
    /// tokens remain.
    fn peek_gap(&self) -> Option<u32> {
        let mut gap = 0u32;
        for token in &self.tokens[self.pos..] {
            match gap_of(token) {
                Some(g) => gap = (gap + g).min(ANY_GAP),
                None => return Some(gap),
            }
        }
        None
    }

    fn consume_to_term(&mut self) -> Option<String> {
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            if gap_of(&token).is_none() {
                return Some(token);
            }
        }
        None
    }
}

/// A token made of nothing but `*`, allowing the path tokenizer's `.`
/// prefix and `/` suffix markers. One star widens the gap by one, more
/// stars mean any distance.
fn gap_of(token: &str) -> Option<u32> {
    let core = token.trim_start_matches('.').trim_end_matches('/');
    if !core.is_empty() && core.chars().all(|c| c == '*') {
        Some(if core.len() == 1 { 1 } else { ANY_GAP })
    } else {
        None
    }
}

/// Canonical form of a phrase, used to pin down grouping.
pub fn parse_to_string(text: &str) -> String {
    let tokens: Vec<String> = ContentTokens::with_wildcards(text).collect();
    match GapPhraseParser::new(tokens).parse() {
        Some(phrase) => phrase.to_string(),
        None => String::new(),
    }
}
