use crate::engine::EngineReader;
use crate::types::{field, Revision};

/// Filters documents to those whose validity window overlaps the
/// queried revision range: `rev_first <= last && rev_last >= first`.
///
/// Both halves come from ordered term scans over the 8-digit revision
/// dictionaries, so cost is proportional to the number of distinct
/// revisions, not documents.
#[derive(Debug, Clone, Copy)]
pub struct RevisionRangeFilter {
    pub first: Revision,
    pub last: Revision,
}

impl RevisionRangeFilter {
    pub fn new(first: Revision, last: Revision) -> Self {
        RevisionRangeFilter { first, last }
    }

    /// One bit per document slot of the reader's segment.
    pub fn bits(&self, reader: &EngineReader) -> Vec<bool> {
        let segment = reader.segment();
        let mut bits = vec![false; segment.max_doc() as usize];

        // An ALL sentinel on either end spans every window.
        if self.first == Revision::ALL || self.last == Revision::ALL {
            for (i, bit) in bits.iter_mut().enumerate() {
                *bit = segment.is_alive(i as u32);
            }
            return bits;
        }

        // Include docs whose window end reaches the range start.
        for (_, postings) in segment.terms_from(field::REVISION_LAST, &self.first.sortable()) {
            for posting in postings {
                if segment.is_alive(posting.doc) {
                    bits[posting.doc as usize] = true;
                }
            }
        }

        // Drop docs whose window starts after the range end.
        if self.last < Revision::HEAD {
            for (_, postings) in
                segment.terms_from(field::REVISION_FIRST, &self.last.next().sortable())
            {
                for posting in postings {
                    bits[posting.doc as usize] = false;
                }
            }
        }
        bits
    }
}
