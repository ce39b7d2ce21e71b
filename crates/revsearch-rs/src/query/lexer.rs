use crate::engine::query::Occur;

/// Raw query tokens. Field prefixes (`name:`) become their own token;
/// chained prefixes like `svn:eol-style:` come out as two Field
/// tokens and are re-joined by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Left,
    Right,
    Operator(Occur),
    Field(String),
    Term(String),
}

/// Character-level query scanner. `+`, `#` and `-` in term position
/// are occurrence operators; `"` suppresses whitespace and paren
/// splitting until the closing quote.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        while let Some(token) = lexer.next_token() {
            out.push(token);
        }
        out
    }

    pub fn next_token(&mut self) -> Option<Token> {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
        let c = *self.chars.get(self.pos)?;
        match c {
            '(' => {
                self.pos += 1;
                Some(Token::Left)
            }
            ')' => {
                self.pos += 1;
                Some(Token::Right)
            }
            '+' => {
                self.pos += 1;
                Some(Token::Operator(Occur::Must))
            }
            '#' => {
                self.pos += 1;
                Some(Token::Operator(Occur::Should))
            }
            '-' => {
                self.pos += 1;
                Some(Token::Operator(Occur::MustNot))
            }
            _ => self.word(),
        }
    }

    fn word(&mut self) -> Option<Token> {
        let mut text = String::new();
        let mut quoted = false;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c == '"' {
                quoted = !quoted;
                self.pos += 1;
                continue;
            }
            if !quoted {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                if c == ':' {
                    self.pos += 1;
                    return Some(Token::Field(text));
                }
            }
            text.push(c);
            self.pos += 1;
        }
        if text.is_empty() {
            // Bare quotes; skip and continue.
            self.next_token()
        } else {
            Some(Token::Term(text))
        }
    }
}
