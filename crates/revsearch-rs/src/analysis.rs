//! Token producers for the indexed fields. All of them are plain
//! iterators: finite, restartable by re-constructing from the source
//! text, and independent of the engine.

const MAX_TOKEN_LEN: usize = 100;

/// Uppercase word tokens from free text. A word is a maximal run of
/// alphanumeric characters and `_`; everything else separates tokens.
/// With `wildcards` enabled, `*` and `?` also count as word characters
/// (used when tokenizing query text, never indexed content).
pub struct ContentTokens<'a> {
    chars: std::str::Chars<'a>,
    wildcards: bool,
}

impl<'a> ContentTokens<'a> {
    pub fn new(text: &'a str) -> Self {
        ContentTokens {
            chars: text.chars(),
            wildcards: false,
        }
    }

    pub fn with_wildcards(text: &'a str) -> Self {
        ContentTokens {
            chars: text.chars(),
            wildcards: true,
        }
    }

}

impl Iterator for ContentTokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let wildcards = self.wildcards;
        let is_word =
            |c: char| c.is_alphanumeric() || c == '_' || (wildcards && (c == '*' || c == '?'));
        let mut token = String::new();
        for c in self.chars.by_ref() {
            if is_word(c) {
                if token.len() < MAX_TOKEN_LEN {
                    token.extend(c.to_uppercase());
                }
            } else if !token.is_empty() {
                return Some(token);
            }
        }
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}

/// Uppercase path tokens with boundary markers: `/` ends a token and is
/// kept as a suffix (directory marker), `.` starts a token (extension
/// marker), `:` and `^` are emitted as single-character tokens.
/// `\` normalizes to `/`.
///
/// `/src/fileio.cpp` tokenizes to `/`, `SRC/`, `FILEIO`, `.CPP`; the
/// markers are what anchors path queries to component boundaries.
pub struct PathTokens {
    chars: Vec<char>,
    pos: usize,
}

impl PathTokens {
    pub fn new(path: &str) -> Self {
        PathTokens {
            chars: path.chars().collect(),
            pos: 0,
        }
    }

    fn is_word(c: char) -> bool {
        !(c.is_whitespace() || c == '/' || c == '.' || c == ':' || c == '^')
    }
}

impl Iterator for PathTokens {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut token = String::new();
        while self.pos < self.chars.len() {
            let mut c = self.chars[self.pos];
            self.pos += 1;
            if c == '\\' {
                c = '/';
            }
            if token.is_empty() {
                match c {
                    '.' => token.push('.'),
                    '/' => return Some("/".to_string()),
                    ':' | '^' => return Some(c.to_string()),
                    c if Self::is_word(c) => token.extend(c.to_uppercase()),
                    _ => continue,
                }
            } else if c == '/' {
                token.push('/');
                return Some(token);
            } else if Self::is_word(c) {
                if token.len() < MAX_TOKEN_LEN {
                    token.extend(c.to_uppercase());
                }
            } else {
                // '.'/':'/'^'/whitespace begin something new; re-read it.
                self.pos -= 1;
                return Some(token);
            }
        }
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}

/// End-of-declaration sentinel emitted between externals lines.
pub const EXTERNALS_EOL: &str = ":";

/// Lowercased component tokens from structured external-reference
/// declarations: one `:` sentinel per declaration line, then the
/// `/`-separated components of the line's first column.
pub struct ExternalsTokens {
    tokens: std::vec::IntoIter<String>,
}

impl ExternalsTokens {
    pub fn new(text: &str) -> Self {
        let mut tokens = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tokens.push(EXTERNALS_EOL.to_string());
            let first = line.split_whitespace().next().unwrap_or("");
            for component in first.split(['/', '\\']) {
                if component.is_empty() {
                    continue;
                }
                let mut token = component.to_lowercase();
                token.truncate(MAX_TOKEN_LEN);
                tokens.push(token);
            }
        }
        ExternalsTokens {
            tokens: tokens.into_iter(),
        }
    }
}

impl Iterator for ExternalsTokens {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.tokens.next()
    }
}
