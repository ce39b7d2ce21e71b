//! A [`RepositoryAccess`] that replays a recorded history. Each
//! revision is materialized into a full tree snapshot up front, so
//! lookups at any revision are cheap and `for_each_child` sees the
//! tree as it stands at the end of a revision.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Revision;

use super::{
    ChangeKind, PathChange, PathInfo, RepoError, RepoResult, RepositoryAccess, RevisionData,
};

fn default_uri() -> String {
    "scripted://history".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedHistory {
    #[serde(default = "default_uri")]
    pub uri: String,
    pub revisions: Vec<ScriptedRevision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedRevision {
    pub revision: u32,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    pub changes: Vec<ScriptedChange>,
}

/// One path change. Directories carry a trailing `/` in `path`.
/// `copy_from` is `[source_path, source_revision]`; the subtree is
/// cloned from that revision's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedChange {
    pub kind: ChangeKind,
    pub path: String,
    #[serde(default)]
    pub is_copy: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub copy_from: Option<(String, u32)>,
    #[serde(default)]
    pub unreadable: bool,
}

#[derive(Debug, Clone)]
struct Node {
    author: String,
    timestamp: DateTime<Utc>,
    content: Option<String>,
    properties: BTreeMap<String, String>,
    unreadable: bool,
}

type Tree = BTreeMap<String, Node>;

pub struct ScriptedRepository {
    uri: String,
    revisions: BTreeMap<u32, ScriptedRevision>,
    /// Tree snapshot at the END of each revision.
    snapshots: BTreeMap<u32, Tree>,
}

impl ScriptedRepository {
    pub fn new(history: ScriptedHistory) -> Result<Self> {
        let mut snapshots = BTreeMap::new();
        let mut revisions = BTreeMap::new();
        let mut tree = Tree::new();

        if let Some(first) = history.revisions.first() {
            tree.insert(
                "/".to_string(),
                Node {
                    author: first.author.clone(),
                    timestamp: first.timestamp,
                    content: None,
                    properties: BTreeMap::new(),
                    unreadable: false,
                },
            );
        }

        for rev in history.revisions {
            for change in &rev.changes {
                apply_change(&mut tree, &snapshots, &rev, change)?;
            }
            snapshots.insert(rev.revision, tree.clone());
            revisions.insert(rev.revision, rev);
        }

        Ok(ScriptedRepository {
            uri: history.uri,
            revisions,
            snapshots,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading history {}", path.display()))?;
        let history: ScriptedHistory = serde_json::from_slice(&data)
            .with_context(|| format!("parsing history {}", path.display()))?;
        Self::new(history)
    }

    fn snapshot(&self, revision: Revision) -> RepoResult<&Tree> {
        self.snapshots
            .range(..=revision.0)
            .next_back()
            .map(|(_, tree)| tree)
            .ok_or_else(|| RepoError::NotFound(format!("revision {}", revision.0)))
    }

    fn node(&self, path: &str, revision: Revision) -> RepoResult<Option<&Node>> {
        Ok(self.snapshot(revision)?.get(path))
    }
}

fn apply_change(
    tree: &mut Tree,
    snapshots: &BTreeMap<u32, Tree>,
    rev: &ScriptedRevision,
    change: &ScriptedChange,
) -> Result<()> {
    let is_dir = change.path.ends_with('/');
    match change.kind {
        ChangeKind::Delete => {
            delete_subtree(tree, &change.path);
        }
        ChangeKind::Add | ChangeKind::Modify | ChangeKind::Replace => {
            if change.kind == ChangeKind::Replace {
                delete_subtree(tree, &change.path);
            }
            if let Some((src, src_rev)) = &change.copy_from {
                let source = snapshots
                    .get(src_rev)
                    .with_context(|| format!("copy source revision {src_rev} not recorded"))?;
                for (path, node) in source {
                    if let Some(rest) = path.strip_prefix(src.as_str()) {
                        tree.insert(format!("{}{rest}", change.path), node.clone());
                    }
                }
                // The copy root itself.
                if let Some(node) = source.get(src) {
                    tree.insert(change.path.clone(), node.clone());
                }
            }
            let node = tree.entry(change.path.clone()).or_insert_with(|| Node {
                author: rev.author.clone(),
                timestamp: rev.timestamp,
                content: if is_dir { None } else { Some(String::new()) },
                properties: BTreeMap::new(),
                unreadable: false,
            });
            node.author = rev.author.clone();
            node.timestamp = rev.timestamp;
            if let Some(content) = &change.content {
                node.content = Some(content.clone());
            }
            node.properties.extend(change.properties.clone());
            node.unreadable = change.unreadable;
        }
    }
    Ok(())
}

fn delete_subtree(tree: &mut Tree, path: &str) {
    tree.remove(path);
    if path.ends_with('/') {
        tree.retain(|p, _| !p.starts_with(path));
    }
}

impl RepositoryAccess for ScriptedRepository {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn youngest_revision(&self) -> RepoResult<Revision> {
        self.revisions
            .keys()
            .next_back()
            .map(|&r| Revision(r))
            .ok_or_else(|| RepoError::NotFound("empty history".into()))
    }

    fn revision_data(&self, revision: Revision) -> RepoResult<RevisionData> {
        let Some(rev) = self.revisions.get(&revision.0) else {
            // A revision the history does not record touched nothing
            // under the indexed tree.
            let youngest = self.youngest_revision()?;
            if revision.0 == 0 || revision > youngest {
                return Err(RepoError::NotFound(format!("revision {}", revision.0)));
            }
            let timestamp = self
                .revisions
                .range(..revision.0)
                .next_back()
                .map(|(_, r)| r.timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            return Ok(RevisionData {
                revision,
                author: String::new(),
                timestamp,
                message: String::new(),
                changes: Vec::new(),
            });
        };
        Ok(RevisionData {
            revision,
            author: rev.author.clone(),
            timestamp: rev.timestamp,
            message: rev.message.clone(),
            changes: rev
                .changes
                .iter()
                .map(|c| PathChange {
                    kind: c.kind,
                    path: c.path.clone(),
                    revision,
                    is_copy: c.is_copy || c.copy_from.is_some(),
                })
                .collect(),
        })
    }

    fn for_each_child(
        &self,
        path: &str,
        revision: Revision,
        visit: &mut dyn FnMut(&str),
    ) -> RepoResult<()> {
        let tree = self.snapshot(revision)?;
        for child in tree.keys() {
            if child != path && child.starts_with(path) {
                visit(child);
            }
        }
        Ok(())
    }

    fn path_info(&self, path: &str, revision: Revision) -> RepoResult<Option<PathInfo>> {
        Ok(self.node(path, revision)?.and_then(|node| {
            if node.unreadable {
                return None;
            }
            Some(PathInfo {
                author: node.author.clone(),
                timestamp: node.timestamp,
                size: node.content.as_ref().map(|c| c.len() as u64),
                is_directory: path.ends_with('/'),
            })
        }))
    }

    fn path_properties(
        &self,
        path: &str,
        revision: Revision,
    ) -> RepoResult<BTreeMap<String, String>> {
        Ok(self
            .node(path, revision)?
            .map(|node| node.properties.clone())
            .unwrap_or_default())
    }

    fn path_content(
        &self,
        path: &str,
        revision: Revision,
        limit: u64,
    ) -> RepoResult<Option<String>> {
        Ok(self.node(path, revision)?.and_then(|node| {
            node.content.as_ref().map(|content| {
                let mut end = (limit as usize).min(content.len());
                while end < content.len() && !content.is_char_boundary(end) {
                    end -= 1;
                }
                content[..end].to_string()
            })
        }))
    }

    fn log_message(&self, revision: Revision) -> RepoResult<String> {
        self.revisions
            .get(&revision.0)
            .map(|rev| rev.message.clone())
            .ok_or_else(|| RepoError::NotFound(format!("revision {}", revision.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rev(n: u32, changes: Vec<ScriptedChange>) -> ScriptedRevision {
        ScriptedRevision {
            revision: n,
            author: "alice".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, n as u32 % 28 + 1, 12, 0, 0).unwrap(),
            message: format!("r{n}"),
            changes,
        }
    }

    fn add(path: &str, content: &str) -> ScriptedChange {
        ScriptedChange {
            kind: ChangeKind::Add,
            path: path.into(),
            is_copy: false,
            content: if path.ends_with('/') { None } else { Some(content.into()) },
            properties: BTreeMap::new(),
            copy_from: None,
            unreadable: false,
        }
    }

    fn repo(revisions: Vec<ScriptedRevision>) -> ScriptedRepository {
        ScriptedRepository::new(ScriptedHistory {
            uri: default_uri(),
            revisions,
        })
        .unwrap()
    }

    #[test]
    fn snapshots_are_per_revision() {
        let repo = repo(vec![
            rev(1, vec![add("/a.txt", "one")]),
            rev(2, vec![ScriptedChange {
                kind: ChangeKind::Delete,
                path: "/a.txt".into(),
                is_copy: false,
                content: None,
                properties: BTreeMap::new(),
                copy_from: None,
                unreadable: false,
            }]),
        ]);
        assert!(repo.path_info("/a.txt", Revision(1)).unwrap().is_some());
        assert!(repo.path_info("/a.txt", Revision(2)).unwrap().is_none());
        assert_eq!(repo.youngest_revision().unwrap(), Revision(2));
    }

    #[test]
    fn copy_clones_subtree_from_source_revision() {
        let repo = repo(vec![
            rev(1, vec![add("/dir/", ""), add("/dir/f.txt", "body")]),
            rev(2, vec![ScriptedChange {
                kind: ChangeKind::Add,
                path: "/copy/".into(),
                is_copy: true,
                content: None,
                properties: BTreeMap::new(),
                copy_from: Some(("/dir/".into(), 1)),
                unreadable: false,
            }]),
        ]);
        assert!(repo.path_info("/copy/f.txt", Revision(2)).unwrap().is_some());
        assert_eq!(
            repo.path_content("/copy/f.txt", Revision(2), 1024).unwrap(),
            Some("body".into())
        );
    }

    #[test]
    fn children_reflect_end_of_revision_state() {
        // A child deleted in the same revision as the copy never shows
        // up in the enumeration.
        let repo = repo(vec![
            rev(1, vec![add("/dir/", ""), add("/dir/f.txt", "x"), add("/dir/g.txt", "y")]),
            rev(2, vec![
                ScriptedChange {
                    kind: ChangeKind::Add,
                    path: "/copy/".into(),
                    is_copy: true,
                    content: None,
                    properties: BTreeMap::new(),
                    copy_from: Some(("/dir/".into(), 1)),
                    unreadable: false,
                },
                ScriptedChange {
                    kind: ChangeKind::Delete,
                    path: "/copy/f.txt".into(),
                    is_copy: false,
                    content: None,
                    properties: BTreeMap::new(),
                    copy_from: None,
                    unreadable: false,
                },
            ]),
        ]);
        let mut children = Vec::new();
        repo.for_each_child("/copy/", Revision(2), &mut |p| children.push(p.to_string()))
            .unwrap();
        assert_eq!(children, vec!["/copy/g.txt"]);
    }
}
