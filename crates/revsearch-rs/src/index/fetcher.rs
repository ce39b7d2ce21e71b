use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::repo::{with_retries, RepositoryAccess, MIME_TYPE_PROPERTY};
use crate::types::Revision;

use super::{ErrorSlot, PendingIndexJob, PendingJobCounter, WriteJob, WriteStage};

/// Middle pipeline stage: loads properties and content for each
/// pending document on the shared worker pool, then hands the filled
/// job to the write stage.
pub struct ContentFetcher {
    repo: Arc<dyn RepositoryAccess>,
    write: Arc<WriteStage>,
    pool: Arc<rayon::ThreadPool>,
    pending: Arc<PendingJobCounter>,
    errors: Arc<ErrorSlot>,
    max_content_size: u64,
    single_revision: bool,
}

impl ContentFetcher {
    pub fn new(
        repo: Arc<dyn RepositoryAccess>,
        write: Arc<WriteStage>,
        pool: Arc<rayon::ThreadPool>,
        errors: Arc<ErrorSlot>,
        max_content_size: u64,
        single_revision: bool,
    ) -> Arc<Self> {
        Arc::new(ContentFetcher {
            repo,
            write,
            pool,
            pending: Arc::new(PendingJobCounter::default()),
            errors,
            max_content_size,
            single_revision,
        })
    }

    pub fn schedule(self: &Arc<Self>, job: PendingIndexJob) {
        self.pending.increment();
        let fetcher = self.clone();
        self.pool.spawn(move || {
            if let Err(err) = fetcher.fetch(job) {
                fetcher.errors.record(err);
            }
            fetcher.pending.decrement();
        });
    }

    /// Barrier: all scheduled fetches forwarded to the write stage.
    pub fn wait(&self) {
        self.pending.wait();
    }

    fn fetch(&self, mut job: PendingIndexJob) -> Result<()> {
        // In single-revision mode a closed window only produces a
        // delete, so skip the repository round-trips.
        if self.single_revision && job.revision_last != Revision::HEAD {
            return self.write.submit(WriteJob::Document(job));
        }

        let path = job.path.clone();
        let rev = job.revision_first;
        let properties = with_retries("path properties", || {
            self.repo.path_properties(&path, rev)
        })
        .map_err(|e| anyhow!("properties of {path}@{rev}: {e}"))?;

        let is_text = properties
            .get(MIME_TYPE_PROPERTY)
            .map(|mime| mime.starts_with("text/"))
            .unwrap_or(true);

        if !job.info.is_directory {
            let within_limit = job.info.size.unwrap_or(0) <= self.max_content_size;
            if is_text && within_limit {
                job.content = with_retries("path content", || {
                    self.repo.path_content(&path, rev, self.max_content_size)
                })
                .map_err(|e| anyhow!("content of {path}@{rev}: {e}"))?;
                job.binary = job.content.is_none();
            } else {
                job.binary = true;
            }
        }
        if !properties.is_empty() {
            job.properties = Some(properties);
        }
        self.write.submit(WriteJob::Document(job))
    }
}
