use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use wright_core::executor::{
    ExecutionRequest, ExecutorError, FailureNote, FatalError, TaskExecutor, TaskResult,
    TransientFailure,
};

/// What one attempt of a task does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return [`generated_content`].
    Write,
    /// Return this exact content.
    Content(String),
    /// Return a failed [`TaskResult`].
    Reject(String),
    /// Raise an output transient failure.
    Transient(String),
    /// Raise an external transient failure.
    External(String),
    /// Raise a fatal error.
    Fatal,
    /// Sleep, then behave like [`Step::Write`].
    Sleep(Duration),
    /// Cancel the run, then never return.
    CancelAndHang(CancellationToken),
}

/// One recorded call to [`ScriptedExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub task_id: String,
    pub attempt: u32,
    pub prior_failures: Vec<FailureNote>,
    /// Paths committed when the attempt started.
    pub committed_paths: Vec<String>,
}

/// A [`TaskExecutor`] that plays scripted steps per task. Tasks with no
/// remaining steps [`Step::Write`].
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    invocations: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for `task_id`, played one per attempt.
    pub fn script(self, task_id: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .extend(steps);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of attempts made for `task_id`.
    pub fn attempts(&self, task_id: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.task_id == task_id)
            .count()
    }

    /// Task ids in the order attempts started.
    pub fn started(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.task_id.clone())
            .collect()
    }

    /// Highest number of attempts observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn play(&self, step: Step, request: &ExecutionRequest) -> Result<TaskResult, ExecutorError> {
        let task = &request.task;
        match step {
            Step::Write => Ok(TaskResult::success(task, generated_content(request))),
            Step::Content(content) => Ok(TaskResult::success(task, content)),
            Step::Reject(reason) => Ok(TaskResult::failed(task, reason)),
            Step::Transient(reason) => Err(TransientFailure::output(reason).into()),
            Step::External(reason) => Err(TransientFailure::external(reason).into()),
            Step::Fatal => Err(FatalError::MissingDependency {
                task: task.id.clone(),
                dependency: "<scripted>".to_string(),
            }
            .into()),
            Step::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                Ok(TaskResult::success(task, generated_content(request)))
            }
            Step::CancelAndHang(token) => {
                token.cancel();
                std::future::pending().await
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<TaskResult, ExecutorError> {
        self.invocations.lock().unwrap().push(Invocation {
            task_id: request.task.id.clone(),
            attempt: request.attempt,
            prior_failures: request.prior_failures.clone(),
            committed_paths: request.snapshot.paths().map(str::to_owned).collect(),
        });
        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(&request.task.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Write);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.play(step, &request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Content that satisfies the consistency check for `request`: the current
/// file content, imports for every used symbol, then each declared symbol.
pub fn generated_content(request: &ExecutionRequest) -> String {
    let task = &request.task;
    let mut out = match request.snapshot.content(&task.path) {
        Some(existing) => existing.to_string(),
        None => format!("# {}\n", task.path),
    };
    for used in &task.uses {
        out.push_str(&format!("from {} import {}\n", used.task, used.name));
    }
    out.push_str(&format!("# written by {}\n", task.id));
    for symbol in &task.symbols {
        match &symbol.signature {
            Some(sig) => out.push_str(&format!("{sig}:\n    pass\n")),
            None => out.push_str(&format!("def {}():\n    pass\n", symbol.name)),
        }
    }
    out
}
