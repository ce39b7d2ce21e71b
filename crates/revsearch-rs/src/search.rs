//! Read side: open an index, run revision-scoped queries, shape hits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;

use crate::engine::query::{execute, EngineQuery, Occur};
use crate::engine::{props, Engine, EngineReader};
use crate::query::{QueryParser, RevisionRangeFilter};
use crate::types::{field, packed_size, Credentials, Revision};

pub struct Index {
    #[allow(dead_code)]
    dir: PathBuf,
    engine: Arc<Engine>,
    searcher: Mutex<EngineReader>,
}

#[derive(Debug, Clone)]
pub struct IndexProperties {
    pub revision: Revision,
    pub repository_name: String,
    pub local_uri: String,
    pub external_uri: Option<String>,
    pub credentials: Credentials,
    pub single_revision: bool,
    pub total_count: usize,
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub path: String,
    pub revision_first: String,
    pub revision_last: String,
    pub author: String,
    pub timestamp: String,
    pub size: Option<u64>,
}

impl Hit {
    pub fn is_folder(&self) -> bool {
        self.path.ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        !self.is_folder()
    }
}

#[derive(Debug)]
pub struct SearchResult {
    pub hits: Vec<Hit>,
    pub search_time: Duration,
    pub properties: IndexProperties,
}

impl Index {
    pub fn open(dir: &Path) -> Result<Index> {
        let engine = Engine::open(dir)?;
        let searcher = engine.reader();
        Ok(Index {
            dir: dir.to_path_buf(),
            engine,
            searcher: Mutex::new(searcher),
        })
    }

    /// Current committed reader, refreshed when a writer in this
    /// process has committed since the last query.
    fn reader(&self) -> EngineReader {
        let mut searcher = self.searcher.lock();
        if !searcher.is_current(&self.engine) {
            *searcher = self.engine.reader();
        }
        searcher.clone()
    }

    pub fn properties(&self) -> IndexProperties {
        properties_of(&self.reader())
    }

    /// Run a query against the revision range [first, last]. ALL on
    /// either end disables revision filtering; first == HEAD restricts
    /// to currently open windows.
    pub fn query(&self, text: &str, first: Revision, last: Revision) -> Result<SearchResult> {
        let started = Instant::now();
        let reader = self.reader();
        let properties = properties_of(&reader);
        let parsed = QueryParser::new(&reader).parse(text)?;

        let no_filter = properties.single_revision
            || first == Revision::ALL
            || last == Revision::ALL;
        let (query, bits) = if no_filter {
            (parsed, None)
        } else if first == Revision::HEAD {
            // Open windows carry the HEAD sentinel as a keyword, so a
            // term clause beats a dictionary scan here.
            let query = EngineQuery::Boolean {
                clauses: vec![
                    (Occur::Must, parsed),
                    (
                        Occur::Must,
                        EngineQuery::term(field::REVISION_LAST, Revision::HEAD.sortable()),
                    ),
                ],
                min_should: 0,
            };
            (query, None)
        } else {
            let bits = RevisionRangeFilter::new(first, last).bits(&reader);
            (parsed, Some(bits))
        };

        let docs = execute(&reader, &query, bits.as_deref());
        let hits = docs
            .into_iter()
            .filter_map(|doc| hit_from(&reader, doc))
            .collect();
        Ok(SearchResult {
            hits,
            search_time: started.elapsed(),
            properties,
        })
    }
}

fn properties_of(reader: &EngineReader) -> IndexProperties {
    let revision = props::get(reader, props::keys::REVISION)
        .and_then(|v| v.parse::<u32>().ok())
        .map(Revision)
        .unwrap_or(Revision::ALL);
    IndexProperties {
        revision,
        repository_name: props::get(reader, props::keys::REPOSITORY_NAME).unwrap_or_default(),
        local_uri: props::get(reader, props::keys::REPOSITORY_LOCAL_URI).unwrap_or_default(),
        external_uri: props::get(reader, props::keys::REPOSITORY_EXTERNAL_URI),
        credentials: props::get(reader, props::keys::CREDENTIALS)
            .map(|v| Credentials::decode(&v))
            .unwrap_or_default(),
        single_revision: props::get(reader, props::keys::SINGLE_REVISION).as_deref() == Some("true"),
        total_count: reader.num_docs(),
    }
}

fn hit_from(reader: &EngineReader, doc: u32) -> Option<Hit> {
    let id = reader.stored(doc, field::ID)?.to_string();
    let path = id.rsplit_once('@').map(|(p, _)| p.to_string()).unwrap_or_else(|| id.clone());
    let pretty = |value: Option<&str>| {
        value
            .and_then(Revision::from_sortable)
            .map(|r| r.pretty())
            .unwrap_or_default()
    };
    Some(Hit {
        revision_first: pretty(reader.stored(doc, field::REVISION_FIRST)),
        revision_last: pretty(reader.stored(doc, field::REVISION_LAST)),
        author: reader.stored(doc, field::AUTHOR).unwrap_or_default().to_string(),
        timestamp: reader.stored(doc, field::TIMESTAMP).unwrap_or_default().to_string(),
        size: reader
            .stored(doc, field::SIZE)
            .and_then(packed_size::from_sortable),
        id,
        path,
    })
}
