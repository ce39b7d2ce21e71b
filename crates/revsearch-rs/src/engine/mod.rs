//! Minimal positional inverted index with point-in-time readers.
//!
//! The engine keeps two segment instances: a `live` one that a single
//! writer mutates, and a `committed` snapshot behind an `Arc` that
//! readers clone cheaply. `commit` bumps the generation, persists the
//! live segment and publishes it as the new snapshot; readers opened
//! earlier keep seeing their own generation.

mod store;

pub mod props;
pub mod query;

pub use store::{Document, Posting, Segment};

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;

const SEGMENTS_FILE: &str = "segments.json";

pub struct Engine {
    dir: Option<PathBuf>,
    live: RwLock<Segment>,
    committed: RwLock<Arc<Segment>>,
}

impl Engine {
    /// Create a fresh on-disk index, clobbering any previous segment
    /// file in `dir`.
    pub fn create(dir: &Path) -> Result<Arc<Engine>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating index directory {}", dir.display()))?;
        let engine = Engine {
            dir: Some(dir.to_path_buf()),
            live: RwLock::new(Segment::default()),
            committed: RwLock::new(Arc::new(Segment::default())),
        };
        engine.persist(&engine.live.read())?;
        Ok(Arc::new(engine))
    }

    pub fn open(dir: &Path) -> Result<Arc<Engine>> {
        let path = dir.join(SEGMENTS_FILE);
        let data = fs::read(&path)
            .with_context(|| format!("reading index segment {}", path.display()))?;
        let segment: Segment = serde_json::from_slice(&data)
            .with_context(|| format!("parsing index segment {}", path.display()))?;
        Ok(Arc::new(Engine {
            dir: Some(dir.to_path_buf()),
            live: RwLock::new(segment.clone()),
            committed: RwLock::new(Arc::new(segment)),
        }))
    }

    /// An engine with no backing directory; commits publish to
    /// readers but persist nothing.
    pub fn in_memory() -> Arc<Engine> {
        Arc::new(Engine {
            dir: None,
            live: RwLock::new(Segment::default()),
            committed: RwLock::new(Arc::new(Segment::default())),
        })
    }

    /// Snapshot reader over the last committed generation.
    pub fn reader(&self) -> EngineReader {
        EngineReader {
            segment: self.committed.read().clone(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.committed.read().generation
    }

    fn persist(&self, segment: &Segment) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let tmp = dir.join(format!("{SEGMENTS_FILE}.tmp"));
        let data = serde_json::to_vec(segment).context("serializing index segment")?;
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(SEGMENTS_FILE))
            .with_context(|| format!("publishing segment in {}", dir.display()))?;
        Ok(())
    }
}

/// Point-in-time view of one committed generation.
#[derive(Clone)]
pub struct EngineReader {
    segment: Arc<Segment>,
}

impl EngineReader {
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn generation(&self) -> u64 {
        self.segment.generation
    }

    pub fn is_current(&self, engine: &Engine) -> bool {
        self.segment.generation == engine.generation()
    }

    pub fn max_doc(&self) -> u32 {
        self.segment.max_doc()
    }

    pub fn num_docs(&self) -> usize {
        self.segment.num_docs()
    }

    pub fn is_alive(&self, doc: u32) -> bool {
        self.segment.is_alive(doc)
    }

    pub fn stored(&self, doc: u32, field: &str) -> Option<&str> {
        self.segment.doc(doc).and_then(|d| d.stored.get(field)).map(String::as_str)
    }

    pub fn doc_by_id(&self, id: &str) -> Option<&Document> {
        self.segment.doc_by_id(id)
    }
}

/// The single mutator of an engine. The indexing pipeline funnels all
/// writes through one of these on one thread.
pub struct EngineWriter {
    engine: Arc<Engine>,
}

impl EngineWriter {
    pub fn new(engine: Arc<Engine>) -> Self {
        EngineWriter { engine }
    }

    pub fn add(&self, doc: Document) {
        self.engine.live.write().add(doc);
    }

    pub fn delete(&self, id: &str) -> bool {
        self.engine.live.write().delete_id(id)
    }

    /// Persist the live segment and publish it to readers.
    pub fn commit(&self) -> Result<()> {
        let mut live = self.engine.live.write();
        live.generation += 1;
        self.engine.persist(&live)?;
        *self.engine.committed.write() = Arc::new(live.clone());
        Ok(())
    }

    /// Drop tombstones, then commit the compacted segment.
    pub fn optimize(&self) -> Result<()> {
        {
            let mut live = self.engine.live.write();
            let compacted = live.compact();
            *live = compacted;
        }
        self.commit()
    }
}
