use std::path::PathBuf;

use uuid::Uuid;

use wright_store::{RunRecord, RunStatus, TaskState};

/// Final result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    /// `Success`, `Failure`, or `Cancelled`.
    pub status: RunStatus,
    /// Committed `(path, content)` pairs, in path order. Never rolled back.
    pub workspace: Vec<(String, String)>,
    /// First task that failed, when the run failed at a task.
    pub failed_task_id: Option<String>,
    /// Final state of every task, in graph order.
    pub task_states: Vec<(String, TaskState)>,
    pub error: Option<String>,
    pub records: Vec<RunRecord>,
    pub run_log: Option<PathBuf>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Content of a committed file.
    pub fn file(&self, path: &str) -> Option<&str> {
        self.workspace
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.task_states
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, s)| *s)
    }

    /// Number of tasks in `state`.
    pub fn count(&self, state: TaskState) -> usize {
        self.task_states.iter().filter(|(_, s)| *s == state).count()
    }
}
