use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use crate::engine::{props, Engine, EngineWriter};
use crate::repo::{with_retries, ChangeKind, PathChange, RepositoryAccess};
use crate::types::{Credentials, Revision};

use super::{
    ChangeAnalyzer, ContentFetcher, ErrorSlot, IndexLock, RevisionMeta, RevisionTracker, WriteJob,
    WriteStage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Build a fresh index, replaying history from revision 1.
    Create,
    /// Continue an existing index from its stored revision.
    Update,
}

pub struct IndexOptions {
    pub index_dir: PathBuf,
    pub mode: IndexMode,
    /// Stop at this revision instead of the repository's youngest.
    pub max_revision: Option<Revision>,
    pub max_threads: usize,
    /// Revisions per commit batch.
    pub commit_interval: u32,
    /// Compact the index every this many revisions. 0 disables the
    /// cadence; a final compaction still runs at the end.
    pub optimize_every: u32,
    /// Paths matching this pattern are not indexed.
    pub path_filter: Option<String>,
    /// Keep only head documents, dropping every closed window.
    pub single_revision: bool,
    pub repository_name: String,
    pub external_uri: Option<String>,
    pub credentials: Credentials,
    pub max_content_size: u64,
}

impl IndexOptions {
    pub fn new(index_dir: impl Into<PathBuf>, mode: IndexMode, repository_name: &str) -> Self {
        IndexOptions {
            index_dir: index_dir.into(),
            mode,
            max_revision: None,
            max_threads: 4,
            commit_interval: 1000,
            optimize_every: 0,
            path_filter: None,
            single_revision: false,
            repository_name: repository_name.to_string(),
            external_uri: None,
            credentials: Credentials::default(),
            max_content_size: 1 << 20,
        }
    }
}

pub struct Indexer {
    repo: Arc<dyn RepositoryAccess>,
    options: IndexOptions,
}

impl Indexer {
    pub fn new(repo: Arc<dyn RepositoryAccess>, options: IndexOptions) -> Self {
        Indexer { repo, options }
    }

    pub fn run(&self) -> Result<()> {
        let started = Instant::now();
        let opts = &self.options;
        let _lock = IndexLock::acquire(&opts.index_dir)?;

        let engine = match opts.mode {
            IndexMode::Create => Engine::create(&opts.index_dir)?,
            IndexMode::Update => Engine::open(&opts.index_dir)?,
        };
        // The committed state before this run; the tracker resolves
        // open windows against it until the first commit.
        let reader = engine.reader();
        let writer = Arc::new(EngineWriter::new(engine.clone()));

        let (start, single_revision) = match opts.mode {
            IndexMode::Create => (Revision(1), opts.single_revision),
            IndexMode::Update => {
                let last = props::get(&reader, props::keys::REVISION)
                    .ok_or_else(|| anyhow!("index has no revision property, cannot update"))?
                    .parse::<u32>()
                    .context("parsing stored index revision")?;
                let single = props::get(&reader, props::keys::SINGLE_REVISION).as_deref()
                    == Some("true");
                if single != opts.single_revision {
                    tracing::warn!(
                        stored = single,
                        "single-revision setting comes from the index, ignoring flag"
                    );
                }
                (Revision(last).next(), single)
            }
        };

        let youngest = with_retries("youngest revision", || self.repo.youngest_revision())
            .map_err(|e| anyhow!("youngest revision: {e}"))?;
        let stop = opts
            .max_revision
            .map(|r| r.min(youngest))
            .unwrap_or(youngest);
        if start > stop {
            tracing::info!(revision = %stop, "index already up to date");
            return Ok(());
        }

        let path_filter = opts
            .path_filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compiling path filter")?;
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(opts.max_threads)
                .thread_name(|i| format!("index-worker-{i}"))
                .build()
                .context("building worker pool")?,
        );
        let errors = Arc::new(ErrorSlot::default());
        let write = Arc::new(WriteStage::start(
            writer.clone(),
            single_revision,
            opts.max_threads * 4,
        )?);
        let tracker = Arc::new(RevisionTracker::default());
        tracker.refresh(reader);
        let fetcher = ContentFetcher::new(
            self.repo.clone(),
            write.clone(),
            pool.clone(),
            errors.clone(),
            opts.max_content_size,
            single_revision,
        );
        let analyzer = ChangeAnalyzer::new(
            self.repo.clone(),
            tracker.clone(),
            fetcher.clone(),
            pool,
            errors.clone(),
            path_filter,
        );

        tracing::info!(uri = self.repo.uri(), %start, %stop, "indexing");

        // The root never shows up as a change of its own.
        if opts.mode == IndexMode::Create {
            analyzer.schedule(
                PathChange {
                    kind: ChangeKind::Add,
                    path: "/".to_string(),
                    revision: Revision(1),
                    is_copy: false,
                },
                false,
            );
        }

        let mut r0 = start;
        while r0 <= stop {
            let r1 = Revision((r0.0 + opts.commit_interval.max(1) - 1).min(stop.0));
            for r in r0.0..=r1.0 {
                let revision = Revision(r);
                let data = with_retries("revision data", || self.repo.revision_data(revision))
                    .map_err(|e| anyhow!("revision data for {revision}: {e}"))?;
                if !single_revision {
                    write.submit(WriteJob::Revision(RevisionMeta {
                        revision,
                        author: data.author.clone(),
                        timestamp: data.timestamp,
                        message: data.message.clone(),
                    }))?;
                }
                for change in data.changes {
                    analyzer.schedule(change, true);
                }
                // Changes of the next revision may close windows this
                // one opened, so fence between revisions.
                analyzer.wait();
                errors.check()?;
            }

            analyzer.flush_open_documents();
            fetcher.wait();
            errors.check()?;
            write.wait_drained();
            errors.check()?;

            self.store_properties(&writer, r1, single_revision);
            writer.commit()?;
            tracker.refresh(engine.reader());
            tracing::info!(revision = %r1, docs = engine.reader().num_docs(), "committed");

            if opts.optimize_every > 0 && r1.0 % opts.optimize_every == 0 && r1 < stop {
                writer.optimize()?;
                tracker.refresh(engine.reader());
            }
            r0 = r1.next();
        }

        write.finish()?;
        writer.optimize()?;
        tracing::info!(
            elapsed = ?started.elapsed(),
            docs = engine.reader().num_docs(),
            "indexing finished"
        );
        Ok(())
    }

    fn store_properties(&self, writer: &EngineWriter, revision: Revision, single_revision: bool) {
        let opts = &self.options;
        props::set(writer, props::keys::REVISION, &revision.0.to_string());
        props::set(writer, props::keys::REPOSITORY_NAME, &opts.repository_name);
        props::set(writer, props::keys::REPOSITORY_LOCAL_URI, self.repo.uri());
        if let Some(uri) = &opts.external_uri {
            props::set(writer, props::keys::REPOSITORY_EXTERNAL_URI, uri);
        }
        if !opts.credentials.is_empty() {
            props::set(writer, props::keys::CREDENTIALS, &opts.credentials.encode());
        }
        props::set(
            writer,
            props::keys::SINGLE_REVISION,
            if single_revision { "true" } else { "false" },
        );
    }
}
