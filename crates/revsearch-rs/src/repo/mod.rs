//! Source-control access abstraction. The indexing pipeline only talks
//! to a [`RepositoryAccess`]; [`ScriptedRepository`] replays a recorded
//! history for tests and offline runs.

mod scripted;

pub use scripted::{ScriptedChange, ScriptedHistory, ScriptedRepository, ScriptedRevision};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::Revision;

pub const MIME_TYPE_PROPERTY: &str = "svn:mime-type";
pub const EXTERNALS_PROPERTY: &str = "svn:externals";

#[derive(Debug)]
pub enum RepoError {
    /// Path or revision does not exist.
    NotFound(String),
    /// Worth retrying: network hiccups, lock contention.
    Transient(String),
    Fatal(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::NotFound(what) => write!(f, "not found: {what}"),
            RepoError::Transient(what) => write!(f, "transient repository error: {what}"),
            RepoError::Fatal(what) => write!(f, "repository error: {what}"),
        }
    }
}

impl std::error::Error for RepoError {}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    Replace,
}

#[derive(Debug, Clone)]
pub struct PathChange {
    pub kind: ChangeKind,
    pub path: String,
    pub revision: Revision,
    pub is_copy: bool,
}

#[derive(Debug, Clone)]
pub struct RevisionData {
    pub revision: Revision,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub changes: Vec<PathChange>,
}

#[derive(Debug, Clone)]
pub struct PathInfo {
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// None for directories.
    pub size: Option<u64>,
    pub is_directory: bool,
}

/// Read access to one repository. Implementations must be shareable
/// across the analyzer and fetcher worker pools.
pub trait RepositoryAccess: Send + Sync {
    fn uri(&self) -> &str;

    fn youngest_revision(&self) -> RepoResult<Revision>;

    fn revision_data(&self, revision: Revision) -> RepoResult<RevisionData>;

    /// Visit every descendant of a directory, as the tree stands at
    /// the END of `revision`. Paths are repository-absolute, with
    /// directories carrying a trailing `/`.
    fn for_each_child(
        &self,
        path: &str,
        revision: Revision,
        visit: &mut dyn FnMut(&str),
    ) -> RepoResult<()>;

    /// None when the path does not exist at that revision.
    fn path_info(&self, path: &str, revision: Revision) -> RepoResult<Option<PathInfo>>;

    fn path_properties(&self, path: &str, revision: Revision)
        -> RepoResult<BTreeMap<String, String>>;

    /// Text content, truncated to `limit` bytes. `None` when the path
    /// has no content (directories) or cannot be read.
    fn path_content(&self, path: &str, revision: Revision, limit: u64)
        -> RepoResult<Option<String>>;

    fn log_message(&self, revision: Revision) -> RepoResult<String>;
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(100);

/// Run a repository operation with linear-backoff retries on transient
/// failures. NotFound and fatal errors surface immediately.
pub fn with_retries<T>(what: &str, mut f: impl FnMut() -> RepoResult<T>) -> RepoResult<T> {
    let mut attempt = 1;
    loop {
        match f() {
            Err(RepoError::Transient(detail)) if attempt < RETRY_ATTEMPTS => {
                tracing::warn!(%what, %detail, attempt, "transient repository error, retrying");
                std::thread::sleep(RETRY_BASE * attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}
