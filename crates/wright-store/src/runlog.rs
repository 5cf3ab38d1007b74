//! JSONL run log: one [`RunRecord`] per line, appended as the run proceeds.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::fs::StoreError;
use crate::models::RunRecord;

/// Append-only writer for a single run's log file.
#[derive(Debug)]
pub struct RunLogWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl RunLogWriter {
    /// Create (or append to) the log file at `path`, creating parent dirs.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent.display().to_string(), e))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(path.display().to_string(), e))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `record` as one JSON line and flush it.
    pub async fn append(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(self.path.display().to_string(), e))?;
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::io(self.path.display().to_string(), e))
    }
}

/// Read every record from a run log. Blank lines are skipped.
pub async fn read_run_log(path: &Path) -> Result<Vec<RunRecord>, StoreError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::io(path.display().to_string(), e))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Decode {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
