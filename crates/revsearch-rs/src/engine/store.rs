use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One indexed document. Stored fields come back verbatim from search
/// results; indexed fields only exist as postings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub stored: BTreeMap<String, String>,
    pub indexed: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            stored: BTreeMap::new(),
            indexed: BTreeMap::new(),
        }
    }

    pub fn store(&mut self, field: &str, value: impl Into<String>) {
        self.stored.insert(field.to_string(), value.into());
    }

    /// Index a single untokenized term, position 0.
    pub fn index_keyword(&mut self, field: &str, term: impl Into<String>) {
        self.indexed
            .entry(field.to_string())
            .or_default()
            .push(term.into());
    }

    pub fn index_tokens(&mut self, field: &str, tokens: impl Iterator<Item = String>) {
        self.indexed.entry(field.to_string()).or_default().extend(tokens);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub doc: u32,
    pub positions: Vec<u32>,
}

/// A whole index generation: documents plus per-field ordered term
/// dictionaries. Document numbers are assignment order and never
/// reused within a generation; deletes leave a tombstone until
/// `compact` renumbers.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub generation: u64,
    docs: Vec<Option<Document>>,
    by_id: HashMap<String, u32>,
    postings: BTreeMap<String, BTreeMap<String, Vec<Posting>>>,
}

impl Segment {
    /// Number of document slots, including tombstones.
    pub fn max_doc(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn num_docs(&self) -> usize {
        self.docs.iter().filter(|d| d.is_some()).count()
    }

    pub fn doc(&self, n: u32) -> Option<&Document> {
        self.docs.get(n as usize).and_then(|d| d.as_ref())
    }

    pub fn is_alive(&self, n: u32) -> bool {
        self.doc(n).is_some()
    }

    pub fn doc_by_id(&self, id: &str) -> Option<&Document> {
        self.by_id.get(id).and_then(|&n| self.doc(n))
    }

    pub fn add(&mut self, doc: Document) {
        // One live doc per id; the pipeline deletes first, but a
        // same-batch replacement can still land here.
        if let Some(&old) = self.by_id.get(&doc.id) {
            self.docs[old as usize] = None;
        }
        let n = self.docs.len() as u32;
        for (field, terms) in &doc.indexed {
            let dict = self.postings.entry(field.clone()).or_default();
            for (pos, term) in terms.iter().enumerate() {
                let list = dict.entry(term.clone()).or_default();
                // Doc numbers are monotonic, so pushes keep the list sorted.
                match list.last_mut() {
                    Some(p) if p.doc == n => p.positions.push(pos as u32),
                    _ => list.push(Posting {
                        doc: n,
                        positions: vec![pos as u32],
                    }),
                }
            }
        }
        self.by_id.insert(doc.id.clone(), n);
        self.docs.push(Some(doc));
    }

    /// Tombstone a document. Postings stay and are filtered against
    /// liveness at read time until the next `compact`.
    pub fn delete_id(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(n) => {
                self.docs[n as usize] = None;
                true
            }
            None => false,
        }
    }

    /// Postings for one term, or an empty slice. Callers must still
    /// check `is_alive` per posting.
    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|dict| dict.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ordered scan over a field's term dictionary starting at `from`
    /// (inclusive).
    pub fn terms_from<'a>(
        &'a self,
        field: &str,
        from: &str,
    ) -> impl Iterator<Item = (&'a str, &'a [Posting])> + 'a {
        let from = from.to_string();
        self.postings
            .get(field)
            .into_iter()
            .flat_map(move |dict| dict.range(from.clone()..))
            .map(|(term, list)| (term.as_str(), list.as_slice()))
    }

    /// Rebuild without tombstones, renumbering documents.
    pub fn compact(&self) -> Segment {
        let mut fresh = Segment {
            generation: self.generation,
            ..Segment::default()
        };
        for doc in self.docs.iter().flatten() {
            fresh.add(doc.clone());
        }
        fresh
    }
}
