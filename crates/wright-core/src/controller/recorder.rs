//! Run audit trail: every event is kept in memory and, when a log path is
//! configured, appended to the run's JSONL file.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use wright_store::{RunEvent, RunLogWriter, RunRecord, StoreError};

#[derive(Debug)]
pub struct RunRecorder {
    run_id: Uuid,
    writer: Option<RunLogWriter>,
    records: Vec<RunRecord>,
}

impl RunRecorder {
    /// Recorder that keeps records in memory only.
    pub fn in_memory(run_id: Uuid) -> Self {
        Self {
            run_id,
            writer: None,
            records: Vec::new(),
        }
    }

    /// Recorder that also appends to `path`.
    pub async fn to_file(run_id: Uuid, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self {
            run_id,
            writer: Some(RunLogWriter::create(path).await?),
            records: Vec::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.writer.as_ref().map(RunLogWriter::path)
    }

    /// Record an event. A failed log write is logged and the run goes on;
    /// the in-memory record is always kept.
    pub async fn record(&mut self, event: RunEvent) {
        let record = RunRecord::now(self.run_id, event);
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.append(&record).await {
                warn!(run_id = %self.run_id, error = %e, "failed to append to run log");
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn into_parts(self) -> (Vec<RunRecord>, Option<PathBuf>) {
        let path = self.writer.map(|w| w.path().to_path_buf());
        (self.records, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wright_store::{RunStatus, read_run_log};

    #[tokio::test]
    async fn file_recorder_mirrors_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let path = tmp.path().join("runs").join(format!("{run_id}.jsonl"));

        let mut recorder = RunRecorder::to_file(run_id, &path).await.unwrap();
        recorder
            .record(RunEvent::RunStarted {
                request: Some("todo app".into()),
            })
            .await;
        recorder
            .record(RunEvent::RunFinished {
                status: RunStatus::Success,
                failed_task_id: None,
            })
            .await;
        assert_eq!(recorder.path(), Some(path.as_path()));

        let (records, log_path) = recorder.into_parts();
        assert_eq!(log_path.as_deref(), Some(path.as_path()));
        assert_eq!(read_run_log(&path).await.unwrap(), records);
        assert!(records.iter().all(|r| r.run_id == run_id));
    }

    #[tokio::test]
    async fn memory_recorder_has_no_path() {
        let mut recorder = RunRecorder::in_memory(Uuid::nil());
        recorder.record(RunEvent::PlanReady { files: vec![] }).await;
        assert!(recorder.path().is_none());
        assert_eq!(recorder.records().len(), 1);
    }
}
