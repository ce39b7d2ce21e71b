#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use revsearch_rs::repo::{
    ChangeKind, ScriptedChange, ScriptedHistory, ScriptedRepository, ScriptedRevision,
};
use revsearch_rs::{Index, IndexMode, IndexOptions, Indexer, Revision};

pub fn rev(n: u32, changes: Vec<ScriptedChange>) -> ScriptedRevision {
    rev_by(n, "alice", changes)
}

pub fn rev_by(n: u32, author: &str, changes: Vec<ScriptedChange>) -> ScriptedRevision {
    ScriptedRevision {
        revision: n,
        author: author.to_string(),
        timestamp: Utc
            .with_ymd_and_hms(2024, (n - 1) % 12 + 1, (n - 1) % 28 + 1, 12, 0, 0)
            .unwrap(),
        message: format!("change {n}"),
        changes,
    }
}

fn change(kind: ChangeKind, path: &str, content: Option<&str>) -> ScriptedChange {
    ScriptedChange {
        kind,
        path: path.to_string(),
        is_copy: false,
        content: content.map(str::to_string),
        properties: BTreeMap::new(),
        copy_from: None,
        unreadable: false,
    }
}

pub fn add(path: &str, content: &str) -> ScriptedChange {
    change(ChangeKind::Add, path, Some(content))
}

pub fn add_dir(path: &str) -> ScriptedChange {
    change(ChangeKind::Add, path, None)
}

pub fn modify(path: &str, content: &str) -> ScriptedChange {
    change(ChangeKind::Modify, path, Some(content))
}

pub fn delete(path: &str) -> ScriptedChange {
    change(ChangeKind::Delete, path, None)
}

pub fn copy_dir(path: &str, from: &str, from_rev: u32) -> ScriptedChange {
    ScriptedChange {
        kind: ChangeKind::Add,
        path: path.to_string(),
        is_copy: true,
        content: None,
        properties: BTreeMap::new(),
        copy_from: Some((from.to_string(), from_rev)),
        unreadable: false,
    }
}

pub fn with_properties(mut change: ScriptedChange, props: &[(&str, &str)]) -> ScriptedChange {
    for (k, v) in props {
        change.properties.insert(k.to_string(), v.to_string());
    }
    change
}

pub fn history(revisions: Vec<ScriptedRevision>) -> ScriptedHistory {
    ScriptedHistory {
        uri: "scripted://test".to_string(),
        revisions,
    }
}

pub fn index_history(history: ScriptedHistory) -> (TempDir, Index) {
    index_history_to(history, None)
}

pub fn index_history_to(history: ScriptedHistory, max_revision: Option<u32>) -> (TempDir, Index) {
    index_history_with(history, |options| {
        options.max_revision = max_revision.map(Revision);
    })
}

pub fn index_history_with(
    history: ScriptedHistory,
    configure: impl FnOnce(&mut IndexOptions),
) -> (TempDir, Index) {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(ScriptedRepository::new(history).unwrap());
    let mut options = IndexOptions::new(dir.path(), IndexMode::Create, "test");
    options.max_threads = 2;
    configure(&mut options);
    Indexer::new(repo, options).run().unwrap();
    let index = Index::open(dir.path()).unwrap();
    (dir, index)
}

pub fn update_index(dir: &TempDir, history: ScriptedHistory, max_revision: Option<u32>) -> Index {
    let repo = Arc::new(ScriptedRepository::new(history).unwrap());
    let mut options = IndexOptions::new(dir.path(), IndexMode::Update, "test");
    options.max_revision = max_revision.map(Revision);
    options.max_threads = 2;
    Indexer::new(repo, options).run().unwrap();
    Index::open(dir.path()).unwrap()
}

/// All (first, last) windows of a path, in window order.
pub fn windows_of(index: &Index, path: &str) -> Vec<(String, String)> {
    let query = format!("p:{path}");
    let mut hits: Vec<_> = index
        .query(&query, Revision::ALL, Revision::ALL)
        .unwrap()
        .hits
        .into_iter()
        .filter(|h| h.path == path)
        .map(|h| (h.revision_first, h.revision_last))
        .collect();
    hits.sort_by_key(|(first, _)| Revision::parse(first).map(|r| r.0).unwrap_or(0));
    hits
}
