//! Incremental indexing pipeline.
//!
//! Revision changes flow through three stages: [`ChangeAnalyzer`]
//! turns path changes into validity-window jobs, [`ContentFetcher`]
//! loads metadata and content, and [`WriteStage`] applies everything
//! on a single writer thread. The analyzer and fetcher fan out on a
//! shared rayon pool; per-stage [`PendingJobCounter`]s act as barriers
//! between batch phases.

mod analyzer;
mod fetcher;
mod indexer;
mod lock;
mod pending;
mod tracker;
mod write_stage;

pub use analyzer::ChangeAnalyzer;
pub use fetcher::ContentFetcher;
pub use indexer::{IndexMode, IndexOptions, Indexer};
pub use lock::IndexLock;
pub use pending::PendingJobCounter;
pub use tracker::RevisionTracker;
pub use write_stage::{RevisionMeta, WriteJob, WriteStage};

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::repo::PathInfo;
use crate::types::Revision;

/// One document on its way into the index: a path with a validity
/// window. `revision_last` is HEAD for a still-open document; closing
/// a window re-indexes the same first revision with a concrete last.
#[derive(Debug, Clone)]
pub struct PendingIndexJob {
    pub path: String,
    pub revision_first: Revision,
    pub revision_last: Revision,
    pub info: PathInfo,
    pub properties: Option<BTreeMap<String, String>>,
    pub content: Option<String>,
    pub binary: bool,
}

impl PendingIndexJob {
    pub fn new(path: &str, first: Revision, last: Revision, info: PathInfo) -> Self {
        PendingIndexJob {
            path: path.to_string(),
            revision_first: first,
            revision_last: last,
            info,
            properties: None,
            content: None,
            binary: false,
        }
    }

    /// Document id, unique per (path, window start).
    pub fn id(&self) -> String {
        format!("{}@{}", self.path, self.revision_first.sortable())
    }
}

/// First-error latch shared across pipeline workers. Later errors are
/// logged and dropped; the batch loop checks after each barrier.
#[derive(Default)]
pub struct ErrorSlot(Mutex<Option<anyhow::Error>>);

impl ErrorSlot {
    pub fn record(&self, err: anyhow::Error) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            tracing::error!(error = %err, "further pipeline error suppressed");
        }
    }

    /// Take the recorded error, if any, turning it into a Result.
    pub fn check(&self) -> anyhow::Result<()> {
        match self.0.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
