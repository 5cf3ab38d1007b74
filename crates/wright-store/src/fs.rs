//! The file-system collaborator: durable storage for committed workspace
//! entries.
//!
//! The core only needs `read`, `write` and `list`. Writes are whole-file
//! replacements; [`DiskStore`] writes through a temporary file and a rename
//! so a reader never observes a half-written file.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::StoreConfig;

/// Errors raised by a [`FileStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("path {0:?} must be a non-empty relative path inside the workspace")]
    UnsafePath(String),

    #[error("path {0:?} is reserved for wright's own state")]
    ReservedPath(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file {0:?} is not valid UTF-8")]
    NotUtf8(String),

    #[error("failed to encode run record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed run log line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Validate a workspace path and return it as a relative [`PathBuf`].
///
/// Rejects empty paths, absolute paths, `.` and `..` components, and paths
/// inside the `.wright` bookkeeping directory. The path must also be in
/// canonical form (no `//`, interior `./`, or trailing `/`), so two distinct
/// strings never name the same file.
pub fn validate_relative_path(path: &str) -> Result<PathBuf, StoreError> {
    if path.trim().is_empty() {
        return Err(StoreError::UnsafePath(path.to_owned()));
    }
    let candidate = Path::new(path);
    let mut parts = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            _ => return Err(StoreError::UnsafePath(path.to_owned())),
        }
    }
    if parts.join("/") != path {
        return Err(StoreError::UnsafePath(path.to_owned()));
    }
    if StoreConfig::is_state_path(candidate) {
        return Err(StoreError::ReservedPath(path.to_owned()));
    }
    Ok(candidate.to_path_buf())
}

/// Durable storage for workspace files, keyed by relative path.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a file. Returns `Ok(None)` when it does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Replace a file's full content, creating it if necessary.
    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError>;

    /// List every stored path, sorted.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

// Compile-time assertion: FileStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn FileStore) {}
};

// ---------------------------------------------------------------------------
// DiskStore
// ---------------------------------------------------------------------------

/// A [`FileStore`] rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStore for DiskStore {
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        let rel = validate_relative_path(path)?;
        match tokio::fs::read(self.root.join(&rel)).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::NotUtf8(path.to_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let rel = validate_relative_path(path)?;
        let target = self.root.join(&rel);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        let file_name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, content.as_bytes())
            .await
            .map_err(|e| StoreError::io(path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(path, e));
        }

        tracing::debug!(path, bytes = content.len(), "wrote workspace file");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let mut stack = vec![PathBuf::new()];

        while let Some(rel_dir) = stack.pop() {
            let abs = self.root.join(&rel_dir);
            let mut entries = match tokio::fs::read_dir(&abs).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(abs.display().to_string(), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(abs.display().to_string(), e))?
            {
                let rel = rel_dir.join(entry.file_name());
                if StoreConfig::is_state_path(&rel) {
                    continue;
                }
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::io(rel.display().to_string(), e))?;
                if file_type.is_dir() {
                    stack.push(rel);
                } else if file_type.is_file() {
                    let parts: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    out.push(parts.join("/"));
                }
            }
        }

        out.sort();
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-memory [`FileStore`], used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored file.
    pub async fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().await.clone()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        validate_relative_path(path)?;
        Ok(self.files.lock().await.get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        validate_relative_path(path)?;
        self.files
            .lock()
            .await
            .insert(path.to_owned(), content.to_owned());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.files.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_paths() {
        assert_eq!(
            validate_relative_path("src/app.py").unwrap(),
            PathBuf::from("src/app.py")
        );
    }

    #[test]
    fn rejects_unsafe_paths() {
        for bad in ["", "  ", "/etc/passwd", "../escape.py", "a/../../b", "./a.py"] {
            assert!(
                matches!(validate_relative_path(bad), Err(StoreError::UnsafePath(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_canonical_aliases() {
        for alias in ["src/./a.py", "src//a.py", "src/a.py/", "src/."] {
            assert!(
                matches!(validate_relative_path(alias), Err(StoreError::UnsafePath(_))),
                "expected {alias:?} to be rejected"
            );
        }
        assert!(validate_relative_path("src/a.py").is_ok());
    }

    #[test]
    fn rejects_state_dir_paths() {
        assert!(matches!(
            validate_relative_path(".wright/runs/x.jsonl"),
            Err(StoreError::ReservedPath(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_read_write_list() {
        let store = MemoryStore::new();
        assert_eq!(store.read("a.py").await.unwrap(), None);

        store.write("b.py", "two").await.unwrap();
        store.write("a.py", "one").await.unwrap();
        store.write("a.py", "uno").await.unwrap();

        assert_eq!(store.read("a.py").await.unwrap().as_deref(), Some("uno"));
        assert_eq!(store.list().await.unwrap(), vec!["a.py", "b.py"]);
    }

    #[tokio::test]
    async fn memory_store_rejects_unsafe_write() {
        let store = MemoryStore::new();
        let err = store.write("../x", "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::UnsafePath(_)));
        assert!(store.files().await.is_empty());
    }
}
