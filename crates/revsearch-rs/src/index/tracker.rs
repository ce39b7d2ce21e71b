use std::collections::HashMap;

use parking_lot::Mutex;

use crate::engine::EngineReader;
use crate::types::{field, Revision};

#[derive(Default)]
struct Inner {
    /// Path -> first revision of its currently open window. ALL means
    /// the path is known to have no open window.
    open: HashMap<String, Revision>,
    reader: Option<EngineReader>,
}

/// Tracks which validity window is open for each path. Backed by a
/// committed reader for paths not touched since the last commit, with
/// an in-memory overlay for the current batch.
#[derive(Default)]
pub struct RevisionTracker {
    inner: Mutex<Inner>,
}

impl RevisionTracker {
    /// First revision of the path's open window, or ALL when the path
    /// has no live head document.
    pub fn get(&self, path: &str) -> Revision {
        let mut inner = self.inner.lock();
        if let Some(&rev) = inner.open.get(path) {
            return rev;
        }
        let found = inner
            .reader
            .as_ref()
            .map(|reader| lookup(reader, path))
            .unwrap_or(Revision::ALL);
        inner.open.insert(path.to_string(), found);
        found
    }

    /// Record the open-window start for a path. Returns false when the
    /// value was already set, which callers use to drop duplicate
    /// changes within one revision.
    pub fn set(&self, path: &str, revision: Revision) -> bool {
        let mut inner = self.inner.lock();
        match inner.open.insert(path.to_string(), revision) {
            Some(prev) if prev == revision => false,
            _ => true,
        }
    }

    /// Swap in a fresh committed reader and drop the overlay. Called
    /// after every commit.
    pub fn refresh(&self, reader: EngineReader) {
        let mut inner = self.inner.lock();
        inner.open.clear();
        inner.reader = Some(reader);
    }
}

/// Scan the id dictionary for the path's newest window and check
/// whether it is still open.
fn lookup(reader: &EngineReader, path: &str) -> Revision {
    let prefix = format!("{path}@");
    let mut newest: Option<u32> = None;
    for (term, postings) in reader.segment().terms_from(field::ID, &prefix) {
        if !term.starts_with(&prefix) {
            break;
        }
        if postings.iter().any(|p| reader.is_alive(p.doc)) {
            newest = postings.iter().find(|p| reader.is_alive(p.doc)).map(|p| p.doc);
        }
    }
    let Some(doc) = newest else {
        return Revision::ALL;
    };
    let open = reader.stored(doc, field::REVISION_LAST) == Some(Revision::HEAD.sortable().as_str());
    if !open {
        return Revision::ALL;
    }
    reader
        .stored(doc, field::REVISION_FIRST)
        .and_then(Revision::from_sortable)
        .unwrap_or(Revision::ALL)
}
