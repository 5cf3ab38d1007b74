//! Task executor: produces the full new content of one task's target file.
//!
//! The controller spawns each attempt as its own tokio task, so executors
//! are shared as `Arc<dyn TaskExecutor>` and receive everything they need
//! in an owned [`ExecutionRequest`].

pub mod model_executor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::ImplementationTask;
use crate::workspace::WorkspaceSnapshot;

pub use model_executor::ModelExecutor;

/// Why an earlier attempt was rejected. Fed back into the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNote {
    /// Zero-based attempt number that failed.
    pub attempt: u32,
    pub reason: String,
}

/// Input to one execution attempt.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task: ImplementationTask,
    /// Direct dependencies, in execution order.
    pub dependencies: Vec<ImplementationTask>,
    /// Earlier tasks targeting the same file.
    pub earlier_on_path: Vec<ImplementationTask>,
    /// Committed workspace state at dispatch time.
    pub snapshot: WorkspaceSnapshot,
    /// Zero-based attempt number.
    pub attempt: u32,
    pub prior_failures: Vec<FailureNote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub path: String,
    /// Full file content. Empty when the attempt failed.
    pub content: String,
    pub status: ResultStatus,
    pub failure: Option<String>,
}

impl TaskResult {
    pub fn success(task: &ImplementationTask, content: String) -> Self {
        Self {
            task_id: task.id.clone(),
            path: task.path.clone(),
            content,
            status: ResultStatus::Success,
            failure: None,
        }
    }

    /// A rejected attempt; retried by the controller.
    pub fn failed(task: &ImplementationTask, reason: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            path: task.path.clone(),
            content: String::new(),
            status: ResultStatus::Failed,
            failure: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// A failed attempt that may succeed on retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct TransientFailure {
    pub reason: String,
    /// External-call failures (model unavailable, timeout) back off before
    /// the retry.
    pub external: bool,
}

impl TransientFailure {
    pub fn output(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            external: false,
        }
    }

    pub fn external(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            external: true,
        }
    }
}

/// Ordering preconditions that indicate a scheduling bug. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error("task {task:?} dispatched before dependency {dependency:?} was committed")]
    MissingDependency { task: String, dependency: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("transient failure: {0}")]
    Transient(#[from] TransientFailure),

    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

/// Produces file content for a task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<TaskResult, ExecutorError>;
}

// Compile-time assertion: TaskExecutor must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TaskExecutor) {}
};

/// Fail with [`FatalError::MissingDependency`] unless every dependency of
/// the task is committed in the snapshot.
pub fn ensure_dependencies_committed(request: &ExecutionRequest) -> Result<(), FatalError> {
    match request
        .task
        .depends_on
        .iter()
        .find(|dep| !request.snapshot.is_committed(dep))
    {
        Some(dep) => Err(FatalError::MissingDependency {
            task: request.task.id.clone(),
            dependency: dep.clone(),
        }),
        None => Ok(()),
    }
}
