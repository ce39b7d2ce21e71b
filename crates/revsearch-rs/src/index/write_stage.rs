use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::analysis::{ContentTokens, ExternalsTokens, PathTokens};
use crate::engine::{Document, EngineWriter};
use crate::repo::{EXTERNALS_PROPERTY, MIME_TYPE_PROPERTY};
use crate::types::{field, packed_size, Revision, BINARY_TOKEN};

use super::{PendingIndexJob, PendingJobCounter};

pub const REVISION_DOC_PREFIX: &str = "$rev@";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Commit metadata indexed as its own document, so log messages and
/// authors are searchable per revision.
#[derive(Debug, Clone)]
pub struct RevisionMeta {
    pub revision: Revision,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug)]
pub enum WriteJob {
    Document(PendingIndexJob),
    Revision(RevisionMeta),
}

/// Last pipeline stage: a single thread owning all index mutations,
/// fed over a bounded channel. The channel bound doubles as admission
/// control for the fan-out stages upstream.
pub struct WriteStage {
    tx: Mutex<Option<Sender<WriteJob>>>,
    pending: Arc<PendingJobCounter>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriteStage {
    pub fn start(writer: Arc<EngineWriter>, single_revision: bool, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded::<WriteJob>(capacity);
        let pending = Arc::new(PendingJobCounter::default());
        let thread_pending = pending.clone();
        let handle = std::thread::Builder::new()
            .name("index-writer".to_string())
            .spawn(move || {
                for job in rx {
                    apply(&writer, single_revision, job);
                    thread_pending.decrement();
                }
            })
            .map_err(|e| anyhow!("spawning index writer thread: {e}"))?;
        Ok(WriteStage {
            tx: Mutex::new(Some(tx)),
            pending,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn submit(&self, job: WriteJob) -> Result<()> {
        self.pending.increment();
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) if tx.send(job).is_ok() => Ok(()),
            _ => {
                self.pending.decrement();
                Err(anyhow!("index writer thread is gone"))
            }
        }
    }

    /// Block until every submitted job has been applied.
    pub fn wait_drained(&self) {
        self.pending.wait();
    }

    /// Close the channel and join the writer thread.
    pub fn finish(&self) -> Result<()> {
        self.tx.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            handle
                .join()
                .map_err(|_| anyhow!("index writer thread panicked"))?;
        }
        Ok(())
    }
}

fn apply(writer: &EngineWriter, single_revision: bool, job: WriteJob) {
    match job {
        WriteJob::Document(job) => {
            let id = job.id();
            writer.delete(&id);
            // Single-revision indexes keep only open head documents;
            // closing a window is just a delete.
            if single_revision && job.revision_last != Revision::HEAD {
                return;
            }
            writer.add(build_document(&id, &job));
        }
        WriteJob::Revision(meta) => {
            let id = format!("{REVISION_DOC_PREFIX}{}", meta.revision.sortable());
            writer.delete(&id);
            writer.add(build_revision(&id, &meta));
        }
    }
}

fn build_document(id: &str, job: &PendingIndexJob) -> Document {
    let mut doc = Document::new(id);
    doc.index_keyword(field::ID, id);
    doc.store(field::ID, id);
    doc.index_tokens(field::PATH, PathTokens::new(&job.path));
    doc.index_keyword(field::REVISION_FIRST, job.revision_first.sortable());
    doc.store(field::REVISION_FIRST, job.revision_first.sortable());
    doc.index_keyword(field::REVISION_LAST, job.revision_last.sortable());
    doc.store(field::REVISION_LAST, job.revision_last.sortable());
    doc.index_keyword(field::AUTHOR, job.info.author.to_lowercase());
    doc.store(field::AUTHOR, &job.info.author);
    doc.store(
        field::TIMESTAMP,
        job.info.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    );
    if let Some(size) = job.info.size {
        let packed = packed_size::to_sortable(size);
        doc.index_keyword(field::SIZE, packed.clone());
        doc.store(field::SIZE, packed);
    }
    if job.binary {
        doc.index_keyword(field::CONTENT, BINARY_TOKEN);
    } else if let Some(content) = &job.content {
        doc.index_tokens(field::CONTENT, ContentTokens::new(content));
    }
    if let Some(properties) = &job.properties {
        for (name, value) in properties {
            match name.as_str() {
                MIME_TYPE_PROPERTY => {
                    doc.index_keyword(field::TYPE, value.to_lowercase());
                    doc.store(field::TYPE, value);
                }
                EXTERNALS_PROPERTY => {
                    doc.index_tokens(field::EXTERNALS, ExternalsTokens::new(value));
                }
                _ => doc.index_tokens(name, ContentTokens::new(value)),
            }
        }
    }
    doc
}

fn build_revision(id: &str, meta: &RevisionMeta) -> Document {
    let mut doc = Document::new(id);
    doc.index_keyword(field::ID, id);
    doc.store(field::ID, id);
    doc.index_keyword(field::REVISION_FIRST, meta.revision.sortable());
    doc.store(field::REVISION_FIRST, meta.revision.sortable());
    doc.index_keyword(field::REVISION_LAST, meta.revision.sortable());
    doc.store(field::REVISION_LAST, meta.revision.sortable());
    doc.index_keyword(field::AUTHOR, meta.author.to_lowercase());
    doc.store(field::AUTHOR, &meta.author);
    doc.store(
        field::TIMESTAMP,
        meta.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    );
    doc.index_tokens(field::MESSAGE, ContentTokens::new(&meta.message));
    doc.store(field::MESSAGE, &meta.message);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::repo::PathInfo;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn info(size: Option<u64>) -> PathInfo {
        PathInfo {
            author: "Alice".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            size,
            is_directory: size.is_none(),
        }
    }

    #[test]
    fn documents_land_with_window_fields() {
        let engine = Engine::in_memory();
        let writer = Arc::new(EngineWriter::new(engine.clone()));
        let stage = WriteStage::start(writer.clone(), false, 4).unwrap();

        let mut job = PendingIndexJob::new(
            "/src/fileio.cpp",
            Revision(3),
            Revision::HEAD,
            info(Some(10)),
        );
        job.content = Some("hello world".into());
        stage.submit(WriteJob::Document(job)).unwrap();
        stage.wait_drained();
        stage.finish().unwrap();
        writer.commit().unwrap();

        let reader = engine.reader();
        let doc = reader.doc_by_id("/src/fileio.cpp@00000003").unwrap();
        assert_eq!(
            doc.stored.get(field::REVISION_LAST).map(String::as_str),
            Some("99999999")
        );
        assert_eq!(doc.indexed.get(field::CONTENT).unwrap(), &["HELLO", "WORLD"]);
        assert!(doc.indexed.get(field::PATH).unwrap().contains(&".CPP".to_string()));
    }

    #[test]
    fn binary_and_properties() {
        let engine = Engine::in_memory();
        let writer = Arc::new(EngineWriter::new(engine.clone()));
        let stage = WriteStage::start(writer.clone(), false, 4).unwrap();

        let mut job = PendingIndexJob::new("/img.png", Revision(1), Revision::HEAD, info(Some(99)));
        job.binary = true;
        let mut props = BTreeMap::new();
        props.insert(MIME_TYPE_PROPERTY.to_string(), "image/png".to_string());
        props.insert("svn:keywords".to_string(), "Id Rev".to_string());
        job.properties = Some(props);
        stage.submit(WriteJob::Document(job)).unwrap();
        stage.wait_drained();
        stage.finish().unwrap();
        writer.commit().unwrap();

        let reader = engine.reader();
        let doc = reader.doc_by_id("/img.png@00000001").unwrap();
        assert_eq!(doc.indexed.get(field::CONTENT).unwrap(), &[BINARY_TOKEN]);
        assert_eq!(doc.indexed.get(field::TYPE).unwrap(), &["image/png"]);
        assert_eq!(doc.indexed.get("svn:keywords").unwrap(), &["ID", "REV"]);
    }

    #[test]
    fn single_revision_drops_closed_windows() {
        let engine = Engine::in_memory();
        let writer = Arc::new(EngineWriter::new(engine.clone()));
        let stage = WriteStage::start(writer.clone(), true, 4).unwrap();

        let open = PendingIndexJob::new("/a", Revision(1), Revision::HEAD, info(Some(1)));
        stage.submit(WriteJob::Document(open)).unwrap();
        stage.wait_drained();
        let closed = PendingIndexJob::new("/a", Revision(1), Revision(4), info(Some(1)));
        stage.submit(WriteJob::Document(closed)).unwrap();
        stage.wait_drained();
        stage.finish().unwrap();
        writer.commit().unwrap();

        assert_eq!(engine.reader().num_docs(), 0);
    }
}
