//! The revision range filter against a brute-force window predicate.

use proptest::prelude::*;

use revsearch_rs::engine::{Document, Engine, EngineWriter};
use revsearch_rs::query::RevisionRangeFilter;
use revsearch_rs::types::{field, Revision};

fn window_doc(id: &str, first: Revision, last: Revision) -> Document {
    let mut doc = Document::new(id);
    doc.index_keyword(field::ID, id);
    doc.index_keyword(field::REVISION_FIRST, first.sortable());
    doc.index_keyword(field::REVISION_LAST, last.sortable());
    doc
}

/// Contiguous windows from sorted distinct start revisions; the final
/// window stays open.
fn windows_from(starts: &[u32]) -> Vec<(Revision, Revision)> {
    let mut starts: Vec<u32> = starts.to_vec();
    starts.sort_unstable();
    starts.dedup();
    let mut windows = Vec::new();
    for pair in starts.windows(2) {
        windows.push((Revision(pair[0]), Revision(pair[1] - 1)));
    }
    if let Some(&last) = starts.last() {
        windows.push((Revision(last), Revision::HEAD));
    }
    windows
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn filter_agrees_with_the_overlap_predicate(
        starts in prop::collection::vec(1u32..60, 1..8),
        first in 1u32..70,
        len in 0u32..15,
    ) {
        let windows = windows_from(&starts);
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        for (i, &(f, l)) in windows.iter().enumerate() {
            writer.add(window_doc(&format!("d{i}"), f, l));
        }
        writer.commit().unwrap();
        let reader = engine.reader();

        let last = first + len;
        let bits = RevisionRangeFilter::new(Revision(first), Revision(last)).bits(&reader);
        for (i, &(f, l)) in windows.iter().enumerate() {
            let expected = f.0 <= last && l.0 >= first;
            prop_assert_eq!(bits[i], expected, "window [{}, {}] vs [{}, {}]", f, l, first, last);
        }
    }

    #[test]
    fn all_to_head_includes_every_window(starts in prop::collection::vec(1u32..60, 1..8)) {
        let windows = windows_from(&starts);
        let engine = Engine::in_memory();
        let writer = EngineWriter::new(engine.clone());
        for (i, &(f, l)) in windows.iter().enumerate() {
            writer.add(window_doc(&format!("d{i}"), f, l));
        }
        writer.commit().unwrap();
        let bits = RevisionRangeFilter::new(Revision::ALL, Revision::HEAD).bits(&engine.reader());
        prop_assert!(bits.iter().all(|&b| b));
    }
}
