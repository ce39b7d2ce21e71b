use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use regex::Regex;

use crate::repo::{with_retries, ChangeKind, PathChange, RepositoryAccess};
use crate::types::Revision;

use super::{ContentFetcher, ErrorSlot, PendingIndexJob, PendingJobCounter, RevisionTracker};

/// First pipeline stage: turns repository path changes into validity
/// windows.
///
/// Every path carries a window [first, last]; an Add or Modify opens a
/// window at its revision, the next Modify or Delete closes the
/// previous one at revision - 1. Windows opened within the current
/// batch are staged in `head_docs` so a later change in the same batch
/// can close or discard them before anything reaches the index.
pub struct ChangeAnalyzer {
    repo: Arc<dyn RepositoryAccess>,
    tracker: Arc<RevisionTracker>,
    fetcher: Arc<ContentFetcher>,
    pool: Arc<rayon::ThreadPool>,
    pending: Arc<PendingJobCounter>,
    errors: Arc<ErrorSlot>,
    path_filter: Option<Regex>,
    head_docs: Mutex<HashMap<String, PendingIndexJob>>,
}

impl ChangeAnalyzer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn RepositoryAccess>,
        tracker: Arc<RevisionTracker>,
        fetcher: Arc<ContentFetcher>,
        pool: Arc<rayon::ThreadPool>,
        errors: Arc<ErrorSlot>,
        path_filter: Option<Regex>,
    ) -> Arc<Self> {
        Arc::new(ChangeAnalyzer {
            repo,
            tracker,
            fetcher,
            pool,
            pending: Arc::new(PendingJobCounter::default()),
            errors,
            path_filter,
            head_docs: Mutex::new(HashMap::new()),
        })
    }

    /// Queue one change for analysis on the worker pool. `recurse`
    /// lets directory copies and deletes fan out to their children;
    /// re-dispatched child changes run with it off because the child
    /// enumeration is already exhaustive.
    pub fn schedule(self: &Arc<Self>, change: PathChange, recurse: bool) {
        self.pending.increment();
        let analyzer = self.clone();
        self.pool.spawn(move || {
            if let Err(err) = analyzer.analyze(&change, recurse) {
                analyzer.errors.record(err);
            }
            analyzer.pending.decrement();
        });
    }

    /// Barrier: all scheduled changes analyzed, including the child
    /// changes they fanned out.
    pub fn wait(&self) {
        self.pending.wait();
    }

    /// Hand every still-open staged document to the fetcher. Called
    /// once per batch, after the analyze barrier.
    pub fn flush_open_documents(self: &Arc<Self>) {
        let staged: Vec<PendingIndexJob> = {
            let mut head_docs = self.head_docs.lock();
            head_docs.drain().map(|(_, job)| job).collect()
        };
        for job in staged {
            self.fetcher.schedule(job);
        }
    }

    fn analyze(self: &Arc<Self>, change: &PathChange, recurse: bool) -> Result<()> {
        match change.kind {
            ChangeKind::Add => self.add(&change.path, change.revision, change.is_copy, recurse),
            ChangeKind::Modify => self.modify(&change.path, change.revision),
            ChangeKind::Delete => self.delete(&change.path, change.revision, recurse),
            ChangeKind::Replace => {
                self.delete(&change.path, change.revision, true)?;
                self.add(&change.path, change.revision, change.is_copy, recurse)
            }
        }
    }

    fn excluded(&self, path: &str) -> bool {
        match &self.path_filter {
            Some(filter) if filter.is_match(path) => {
                tracing::debug!(%path, "path excluded by filter");
                true
            }
            _ => false,
        }
    }

    fn add(self: &Arc<Self>, path: &str, revision: Revision, is_copy: bool, recurse: bool) -> Result<()> {
        if self.excluded(path) {
            return Ok(());
        }
        // A duplicate add of the same path in one revision is a no-op.
        if !self.tracker.set(path, revision) {
            return Ok(());
        }
        let Some(info) = self.path_info(path, revision)? else {
            return Ok(());
        };
        let is_directory = info.is_directory;
        self.stage(PendingIndexJob::new(path, revision, Revision::HEAD, info));

        // Children of a copied directory never show up as changes of
        // their own, so enumerate them here.
        if is_directory && is_copy && recurse {
            let mut children = Vec::new();
            with_retries("children", || {
                children.clear();
                self.repo
                    .for_each_child(path, revision, &mut |child| children.push(child.to_string()))
            })
            .map_err(|e| anyhow!("children of {path}@{revision}: {e}"))?;
            for child in children {
                self.schedule(
                    PathChange {
                        kind: ChangeKind::Add,
                        path: child,
                        revision,
                        is_copy: false,
                    },
                    false,
                );
            }
        }
        Ok(())
    }

    fn modify(self: &Arc<Self>, path: &str, revision: Revision) -> Result<()> {
        if self.excluded(path) {
            return Ok(());
        }
        self.close_window(path, revision.pred())?;
        if !self.tracker.set(path, revision) {
            return Ok(());
        }
        let Some(info) = self.path_info(path, revision)? else {
            return Ok(());
        };
        self.stage(PendingIndexJob::new(path, revision, Revision::HEAD, info));
        Ok(())
    }

    fn delete(self: &Arc<Self>, path: &str, revision: Revision, recurse: bool) -> Result<()> {
        let end = revision.pred();
        self.close_window(path, end)?;
        self.tracker.set(path, Revision::ALL);

        if recurse && path.ends_with('/') {
            let mut children = Vec::new();
            with_retries("children", || {
                children.clear();
                self.repo
                    .for_each_child(path, end, &mut |child| children.push(child.to_string()))
            })
            .map_err(|e| anyhow!("children of {path}@{end}: {e}"))?;
            for child in children {
                self.schedule(
                    PathChange {
                        kind: ChangeKind::Delete,
                        path: child,
                        revision,
                        is_copy: false,
                    },
                    false,
                );
            }
        }
        Ok(())
    }

    /// Close the window currently open for `path` at `end`. Windows
    /// opened and closed within the same revision would come out
    /// empty and are dropped instead.
    fn close_window(self: &Arc<Self>, path: &str, end: Revision) -> Result<()> {
        if let Some(mut job) = self.head_docs.lock().remove(path) {
            if job.revision_first <= end {
                job.revision_last = end;
                self.fetcher.schedule(job);
            }
            return Ok(());
        }
        let first = self.tracker.get(path);
        if first == Revision::ALL || first > end {
            return Ok(());
        }
        if let Some(info) = self.path_info(path, first)? {
            self.fetcher
                .schedule(PendingIndexJob::new(path, first, end, info));
        }
        Ok(())
    }

    fn stage(&self, job: PendingIndexJob) {
        self.head_docs.lock().insert(job.path.clone(), job);
    }

    fn path_info(&self, path: &str, revision: Revision) -> Result<Option<crate::repo::PathInfo>> {
        let info = with_retries("path info", || self.repo.path_info(path, revision))
            .map_err(|e| anyhow!("info of {path}@{revision}: {e}"))?;
        if info.is_none() {
            tracing::warn!(%path, %revision, "path not readable at revision, dropping");
        }
        Ok(info)
    }
}
