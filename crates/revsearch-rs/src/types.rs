use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field names used by every document in the index.
pub mod field {
    pub const ID: &str = "id";
    pub const REVISION_FIRST: &str = "rev_first";
    pub const REVISION_LAST: &str = "rev_last";
    pub const SIZE: &str = "size";
    pub const TIMESTAMP: &str = "timestamp";
    pub const AUTHOR: &str = "author";
    pub const MESSAGE: &str = "message";
    pub const PATH: &str = "path";
    pub const CONTENT: &str = "content";
    pub const EXTERNALS: &str = "externals";
    pub const TYPE: &str = "type";
}

/// Sentinel token indexed in place of non-text content.
pub const BINARY_TOKEN: &str = "#BINARY";

/// A repository revision number with a fixed-width, lexicographically
/// sortable encoding.
///
/// Two values are reserved: [`Revision::HEAD`] marks a validity window
/// that is still open in the latest indexed revision, and
/// [`Revision::ALL`] means "ignore revision filtering entirely".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Revision(pub u32);

impl Revision {
    /// Highest revision the 8-digit encoding can represent.
    pub const HEAD: Revision = Revision(99_999_999);
    pub const ALL: Revision = Revision(0);

    pub fn new(n: u32) -> Self {
        Revision(n)
    }

    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }

    pub fn pred(self) -> Self {
        Revision(self.0.saturating_sub(1))
    }

    /// 8-digit zero-padded decimal form, comparable as a string.
    pub fn sortable(self) -> String {
        format!("{:08}", self.0)
    }

    pub fn from_sortable(s: &str) -> Option<Self> {
        if s.len() != 8 {
            return None;
        }
        s.parse::<u32>().ok().map(Revision)
    }

    /// Human form: `head`, `all` or the plain number.
    pub fn pretty(self) -> String {
        match self {
            Revision::HEAD => "head".to_string(),
            Revision::ALL => "all".to_string(),
            Revision(n) => n.to_string(),
        }
    }

    /// Parses `head`, `all` or a decimal revision number.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "head" => Ok(Revision::HEAD),
            "all" => Ok(Revision::ALL),
            n => {
                let v: u32 = n
                    .parse()
                    .map_err(|_| anyhow::anyhow!("not a revision: {s:?}"))?;
                anyhow::ensure!(v <= Revision::HEAD.0, "revision {v} out of range");
                Ok(Revision(v))
            }
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

pub mod packed_size {
    //! Bucketed, sortable size encoding: a magnitude prefix (`b`, `k`,
    //! `m`) followed by three hex digits, `z001` for anything of a
    //! gigabyte or more. Range comparisons stay meaningful inside a
    //! magnitude while the representation stays four characters.

    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    pub fn to_sortable(size: u64) -> String {
        if size < KB {
            format!("b{:03X}", size)
        } else if size < MB {
            format!("k{:03X}", size / KB)
        } else if size < GB {
            format!("m{:03X}", size / MB)
        } else {
            "z001".to_string()
        }
    }

    /// Approximate byte count back from the packed form.
    pub fn from_sortable(packed: &str) -> Option<u64> {
        let (magnitude, digits) = packed.split_at(1);
        let v = u64::from_str_radix(digits, 16).ok()?;
        match magnitude {
            "b" => Some(v),
            "k" => Some(v * KB),
            "m" => Some(v * MB),
            "z" => Some(v * GB),
            _ => None,
        }
    }

    pub fn format(size: u64) -> String {
        if size < KB {
            format!("{size} bytes")
        } else if size < MB {
            format!("{} kB", size / KB)
        } else if size < GB {
            format!("{} MB", size / MB)
        } else {
            format!("{} GB", size / GB)
        }
    }
}

/// Repository credentials, persisted in an obfuscated (not encrypted)
/// form so they are not readable at a glance in the index files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

const OBFUSCATION_KEY: &[u8] = b"revsearch-index-properties";

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.password.is_empty()
    }

    pub fn encode(&self) -> String {
        let user = self.user.as_bytes();
        let password = self.password.as_bytes();
        if user.len() > 255 || password.len() > 255 {
            return String::new();
        }
        let mut payload = Vec::with_capacity(2 + user.len() + password.len());
        payload.push(user.len() as u8);
        payload.push(password.len() as u8);
        payload.extend_from_slice(user);
        payload.extend_from_slice(password);
        for (i, b) in payload.iter_mut().enumerate().skip(2) {
            *b ^= OBFUSCATION_KEY[i % OBFUSCATION_KEY.len()];
        }
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    /// Decodes an obfuscated credential string; garbage input yields
    /// empty credentials rather than an error.
    pub fn decode(data: &str) -> Self {
        let Ok(mut payload) = base64::engine::general_purpose::STANDARD.decode(data) else {
            return Credentials::default();
        };
        if payload.len() < 2 {
            return Credentials::default();
        }
        let user_len = payload[0] as usize;
        let password_len = payload[1] as usize;
        if payload.len() != 2 + user_len + password_len {
            return Credentials::default();
        }
        for (i, b) in payload.iter_mut().enumerate().skip(2) {
            *b ^= OBFUSCATION_KEY[i % OBFUSCATION_KEY.len()];
        }
        let user = String::from_utf8_lossy(&payload[2..2 + user_len]).into_owned();
        let password = String::from_utf8_lossy(&payload[2 + user_len..]).into_owned();
        Credentials { user, password }
    }
}
