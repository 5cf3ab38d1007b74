//! The authoritative path → content mapping for a run.
//!
//! Only the controller holds a [`Workspace`] and commits to it. Executors
//! receive a [`WorkspaceSnapshot`]: an immutable, cheaply cloned view of a
//! fully committed state. Commits use copy-on-write, so snapshots handed
//! out earlier never observe later writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use wright_store::content_digest;

/// Current content of one file and the task that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEntry {
    pub content: String,
    pub task_id: String,
    /// Hex SHA-256 of `content`.
    pub digest: String,
}

/// Read-only view of the workspace at one point in time.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    files: Arc<BTreeMap<String, WorkspaceEntry>>,
    committed: Arc<BTreeSet<String>>,
}

impl WorkspaceSnapshot {
    pub fn get(&self, path: &str) -> Option<&WorkspaceEntry> {
        self.files.get(path)
    }

    pub fn content(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|e| e.content.as_str())
    }

    /// Whether the task's result has been committed.
    pub fn is_committed(&self, task_id: &str) -> bool {
        self.committed.contains(task_id)
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &WorkspaceEntry)> {
        self.files.iter().map(|(p, e)| (p.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The mutable workspace owned by the controller.
#[derive(Debug, Default)]
pub struct Workspace {
    current: WorkspaceSnapshot,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current committed state.
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.current.clone()
    }

    /// Replace the entry at `path` with `content` and mark `task_id`
    /// committed.
    pub fn commit(&mut self, task_id: &str, path: &str, content: String) -> &WorkspaceEntry {
        let digest = content_digest(&content);
        Arc::make_mut(&mut self.current.committed).insert(task_id.to_string());
        let files = Arc::make_mut(&mut self.current.files);
        files.insert(
            path.to_string(),
            WorkspaceEntry {
                content,
                task_id: task_id.to_string(),
                digest,
            },
        );
        &files[path]
    }

    pub fn committed_count(&self) -> usize {
        self.current.committed.len()
    }

    /// `(path, content)` pairs in path order.
    pub fn into_entries(self) -> Vec<(String, String)> {
        let files = Arc::unwrap_or_clone(self.current.files);
        files.into_iter().map(|(p, e)| (p, e.content)).collect()
    }
}
