//! Pipeline controller: sequences planner, architect, and coder, and runs
//! the task graph to completion.
//!
//! The controller is the single writer of the workspace. Executor attempts
//! run as spawned tokio tasks bounded by a semaphore and report back over
//! an mpsc channel; verified results are buffered and committed strictly in
//! graph order through a commit cursor.

mod outcome;
pub mod recorder;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use wright_store::{FileStore, RunEvent, RunStatus, StoreError, TaskState};

use crate::config::PipelineConfig;
use crate::consistency;
use crate::error::PipelineError;
use crate::executor::{
    ExecutionRequest, ExecutorError, ModelExecutor, TaskExecutor, TaskResult, TransientFailure,
};
use crate::graph::{Architect, ModelArchitect, TaskGraph};
use crate::model::ModelService;
use crate::plan::{ModelPlanner, Plan, Planner};
use crate::retry::RetryPolicy;
use crate::state::{StateError, TaskTable};
use crate::workspace::Workspace;

pub use outcome::PipelineOutcome;
pub use recorder::RunRecorder;

/// The assembled pipeline: stage implementations, the file-system
/// collaborator, and run configuration.
pub struct Pipeline {
    planner: Arc<dyn Planner>,
    architect: Arc<dyn Architect>,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn FileStore>,
    config: PipelineConfig,
    runs_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(
        planner: Arc<dyn Planner>,
        architect: Arc<dyn Architect>,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn FileStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            planner,
            architect,
            executor,
            store,
            config,
            runs_dir: None,
        }
    }

    /// All three stages backed by one model service.
    pub fn with_model(
        model: Arc<dyn ModelService>,
        store: Arc<dyn FileStore>,
        config: PipelineConfig,
    ) -> Self {
        let policy = config.retry_policy();
        Self::new(
            Arc::new(ModelPlanner::new(Arc::clone(&model), policy)),
            Arc::new(ModelArchitect::new(Arc::clone(&model), policy)),
            Arc::new(ModelExecutor::new(model)),
            store,
            config,
        )
    }

    /// Write each run's audit log to `<runs_dir>/<run_id>.jsonl`.
    pub fn with_run_log(mut self, runs_dir: impl Into<PathBuf>) -> Self {
        self.runs_dir = Some(runs_dir.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Plan, design, and execute a user request.
    pub async fn run(
        &self,
        user_request: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut recorder = self.recorder().await?;
        recorder
            .record(RunEvent::RunStarted {
                request: Some(user_request.to_string()),
            })
            .await;
        info!(run_id = %recorder.run_id(), "pipeline started");

        let planned = tokio::select! {
            planned = self.planner.plan(user_request) => planned,
            _ = cancel.cancelled() => return Ok(self.cancelled_early(recorder).await),
        };
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => return Err(self.abort_early(recorder, e).await),
        };

        self.plan_then_execute(&plan, recorder, cancel).await
    }

    /// Skip the planner and run an existing plan.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut recorder = self.recorder().await?;
        recorder.record(RunEvent::RunStarted { request: None }).await;
        if let Err(e) = plan.validate() {
            return Err(self.abort_early(recorder, e.into()).await);
        }
        self.plan_then_execute(plan, recorder, cancel).await
    }

    /// Skip planner and architect and run an already built graph.
    pub async fn execute_graph(
        &self,
        graph: TaskGraph,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut recorder = self.recorder().await?;
        recorder.record(RunEvent::RunStarted { request: None }).await;
        Ok(self.drive(graph, recorder, cancel).await)
    }

    async fn recorder(&self) -> Result<RunRecorder, PipelineError> {
        let run_id = Uuid::new_v4();
        match &self.runs_dir {
            Some(dir) => Ok(RunRecorder::to_file(run_id, dir.join(format!("{run_id}.jsonl"))).await?),
            None => Ok(RunRecorder::in_memory(run_id)),
        }
    }

    async fn plan_then_execute(
        &self,
        plan: &Plan,
        mut recorder: RunRecorder,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        recorder
            .record(RunEvent::PlanReady {
                files: plan.paths().into_iter().map(str::to_owned).collect(),
            })
            .await;

        let built = tokio::select! {
            built = self.architect.build_graph(plan) => built,
            _ = cancel.cancelled() => return Ok(self.cancelled_early(recorder).await),
        };
        match built {
            Ok(graph) => Ok(self.drive(graph, recorder, cancel).await),
            Err(e) => Err(self.abort_early(recorder, e).await),
        }
    }

    /// Record a failure that happened before any task ran and hand the
    /// error back.
    async fn abort_early(&self, mut recorder: RunRecorder, err: PipelineError) -> PipelineError {
        error!(run_id = %recorder.run_id(), error = %err, "pipeline aborted before execution");
        recorder
            .record(RunEvent::RunFinished {
                status: RunStatus::Failure,
                failed_task_id: None,
            })
            .await;
        err
    }

    async fn cancelled_early(&self, mut recorder: RunRecorder) -> PipelineOutcome {
        info!(run_id = %recorder.run_id(), "pipeline cancelled before execution");
        recorder
            .record(RunEvent::RunFinished {
                status: RunStatus::Cancelled,
                failed_task_id: None,
            })
            .await;
        let run_id = recorder.run_id();
        let (records, run_log) = recorder.into_parts();
        PipelineOutcome {
            run_id,
            status: RunStatus::Cancelled,
            workspace: Vec::new(),
            failed_task_id: None,
            task_states: Vec::new(),
            error: None,
            records,
            run_log,
        }
    }

    async fn drive(
        &self,
        graph: TaskGraph,
        mut recorder: RunRecorder,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        recorder
            .record(RunEvent::GraphReady {
                order: graph.order().into_iter().map(str::to_owned).collect(),
            })
            .await;

        let mut scheduler = Scheduler::new(self, &graph, recorder);
        let end = scheduler.run(&cancel).await;
        scheduler.finish(end).await
    }
}

/// Plan, design, and execute `user_request` with every stage backed by
/// `model`, mirroring commits to `store`.
pub async fn run_pipeline(
    user_request: &str,
    config: PipelineConfig,
    model: Arc<dyn ModelService>,
    store: Arc<dyn FileStore>,
    cancel: CancellationToken,
) -> Result<PipelineOutcome, PipelineError> {
    Pipeline::with_model(model, store, config)
        .run(user_request, cancel)
        .await
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Message sent from a spawned attempt back to the scheduler loop.
struct AttemptDone {
    position: usize,
    attempt: u32,
    outcome: Result<TaskResult, ExecutorError>,
}

/// How the scheduling loop ended.
enum End {
    Success,
    Failed { task_id: String, error: String },
    Cancelled,
}

impl From<StateError> for End {
    fn from(err: StateError) -> Self {
        let task_id = match &err {
            StateError::InvalidTransition { task, .. } | StateError::RetryLimit { task, .. } => {
                task.clone()
            }
        };
        Self::Failed {
            task_id,
            error: err.to_string(),
        }
    }
}

struct Scheduler<'a> {
    graph: &'a TaskGraph,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn FileStore>,
    config: &'a PipelineConfig,
    policy: RetryPolicy,
    recorder: RunRecorder,
    table: TaskTable,
    workspace: Workspace,
    /// Verified results waiting for the commit cursor.
    buffer: BTreeMap<usize, String>,
    cursor: usize,
    in_flight: HashMap<usize, JoinHandle<()>>,
    retry_at: BTreeMap<usize, Instant>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<AttemptDone>,
    rx: Option<mpsc::Receiver<AttemptDone>>,
}

impl<'a> Scheduler<'a> {
    fn new(pipeline: &'a Pipeline, graph: &'a TaskGraph, recorder: RunRecorder) -> Self {
        let config = &pipeline.config;
        let slots = config.max_concurrency.max(1);
        let (tx, rx) = mpsc::channel(slots * 2);
        Self {
            graph,
            executor: Arc::clone(&pipeline.executor),
            store: Arc::clone(&pipeline.store),
            config,
            policy: config.retry_policy(),
            recorder,
            table: TaskTable::new(graph.order(), config.retry_max),
            workspace: Workspace::new(),
            buffer: BTreeMap::new(),
            cursor: 0,
            in_flight: HashMap::new(),
            retry_at: BTreeMap::new(),
            semaphore: Arc::new(Semaphore::new(slots)),
            tx,
            rx: Some(rx),
        }
    }

    async fn run(&mut self, cancel: &CancellationToken) -> End {
        let Some(mut rx) = self.rx.take() else {
            return End::Cancelled;
        };
        let end = match self.schedule(&mut rx, cancel).await {
            Ok(end) => end,
            Err(e) => {
                error!(error = %e, "task state machine rejected a transition");
                End::from(e)
            }
        };
        self.rx = Some(rx);
        end
    }

    async fn schedule(
        &mut self,
        rx: &mut mpsc::Receiver<AttemptDone>,
        cancel: &CancellationToken,
    ) -> Result<End, StateError> {
        loop {
            if cancel.is_cancelled() {
                info!(
                    committed = self.cursor,
                    in_flight = self.in_flight.len(),
                    "pipeline cancelled, draining in-flight tasks"
                );
                return Ok(End::Cancelled);
            }

            if let Some(end) = self.commit_ready().await? {
                return Ok(end);
            }
            if self.cursor == self.graph.len() {
                return Ok(End::Success);
            }

            self.dispatch_ready().await?;

            if self.in_flight.is_empty() && self.retry_at.is_empty() {
                let task_id = self.graph.tasks()[self.cursor].id.clone();
                error!(task_id = %task_id, "no runnable task");
                return Ok(End::Failed {
                    task_id,
                    error: "scheduler stalled with no runnable task".to_string(),
                });
            }

            // A due retry with no free slot waits for an attempt to finish.
            let next_retry = if self.semaphore.available_permits() > 0 {
                self.retry_at.values().min().copied()
            } else {
                None
            };
            tokio::select! {
                done = rx.recv() => {
                    if let Some(done) = done {
                        if let Some(end) = self.handle_done(done).await? {
                            return Ok(end);
                        }
                    }
                }
                _ = tokio::time::sleep_until(next_retry.unwrap_or_else(Instant::now)), if next_retry.is_some() => {}
                _ = cancel.cancelled() => {
                    // Handled at the top of the next iteration.
                }
            }
        }
    }

    /// Apply a state transition and record it.
    async fn transition(&mut self, position: usize, to: TaskState) -> Result<(), StateError> {
        let from = self.table.transition(position, to)?;
        let entry = self.table.get(position);
        let event = RunEvent::Transition {
            task_id: entry.id.clone(),
            from,
            to,
            attempt: entry.attempt,
        };
        self.recorder.record(event).await;
        Ok(())
    }

    async fn record_failure(&mut self, position: usize, reason: String) {
        let attempt = self.table.get(position).attempt;
        self.table.record_failure(position, reason.clone());
        let task_id = self.graph.tasks()[position].id.clone();
        self.recorder
            .record(RunEvent::AttemptFailed {
                task_id,
                attempt,
                reason,
            })
            .await;
    }

    fn dependencies_committed(&self, position: usize) -> bool {
        self.graph.tasks()[position].depends_on.iter().all(|dep| {
            self.graph
                .position(dep)
                .is_some_and(|i| self.table.state(i) == TaskState::Committed)
        })
    }

    /// Start due retries, then PENDING tasks whose dependencies are all
    /// committed, in graph order, while slots are free.
    async fn dispatch_ready(&mut self) -> Result<(), StateError> {
        let now = Instant::now();
        let due: Vec<usize> = self
            .retry_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(p, _)| *p)
            .collect();
        for position in due {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                return Ok(());
            };
            self.retry_at.remove(&position);
            self.spawn_attempt(position, permit);
        }

        for position in self.cursor..self.graph.len() {
            if self.table.state(position) != TaskState::Pending
                || !self.dependencies_committed(position)
            {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };
            self.transition(position, TaskState::Running).await?;
            self.spawn_attempt(position, permit);
        }
        Ok(())
    }

    fn spawn_attempt(&mut self, position: usize, permit: OwnedSemaphorePermit) {
        let entry = self.table.get(position);
        let attempt = entry.attempt;
        let request = ExecutionRequest {
            task: self.graph.tasks()[position].clone(),
            dependencies: self.graph.dependencies_of(position).into_iter().cloned().collect(),
            earlier_on_path: self.graph.earlier_on_path(position).into_iter().cloned().collect(),
            snapshot: self.workspace.snapshot(),
            attempt,
            prior_failures: entry.failures.clone(),
        };
        info!(task_id = %request.task.id, attempt, path = %request.task.path, "dispatching task");

        let executor = Arc::clone(&self.executor);
        let tx = self.tx.clone();
        let timeout = self.config.task_timeout;
        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, executor.execute(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutorError::Transient(TransientFailure::external(format!(
                    "attempt timed out after {timeout:?}"
                )))),
            };
            drop(permit);
            let _ = tx
                .send(AttemptDone {
                    position,
                    attempt,
                    outcome,
                })
                .await;
        });
        self.in_flight.insert(position, handle);
    }

    async fn handle_done(&mut self, done: AttemptDone) -> Result<Option<End>, StateError> {
        if self.in_flight.remove(&done.position).is_none() {
            return Ok(None);
        }
        let graph = self.graph;
        let position = done.position;
        let task = &graph.tasks()[position];

        let failure = match done.outcome {
            Ok(result) if result.is_success() => {
                let problems = consistency::check_in_graph(graph, position, &result.content);
                if problems.is_empty() {
                    info!(task_id = %task.id, attempt = done.attempt, "task output verified");
                    self.buffer.insert(position, result.content);
                    return Ok(None);
                }
                let lines: Vec<String> = problems.iter().map(|p| format!("- {p}")).collect();
                TransientFailure::output(format!("inconsistent output:\n{}", lines.join("\n")))
            }
            Ok(result) => TransientFailure::output(
                result
                    .failure
                    .unwrap_or_else(|| "executor reported failure".to_string()),
            ),
            Err(ExecutorError::Transient(failure)) => failure,
            Err(ExecutorError::Fatal(fatal)) => {
                error!(task_id = %task.id, error = %fatal, "fatal executor error, aborting");
                self.transition(position, TaskState::Failed).await?;
                self.record_failure(position, fatal.to_string()).await;
                return Ok(Some(End::Failed {
                    task_id: task.id.clone(),
                    error: fatal.to_string(),
                }));
            }
        };

        self.transition(position, TaskState::Failed).await?;
        self.record_failure(position, failure.reason.clone()).await;

        if !self.table.can_retry(position) {
            let attempts = done.attempt + 1;
            error!(
                task_id = %task.id,
                attempts,
                reason = %failure.reason,
                "task failed after exhausting retries"
            );
            return Ok(Some(End::Failed {
                task_id: task.id.clone(),
                error: format!(
                    "task {} failed after {attempts} attempt(s): {}",
                    task.id, failure.reason
                ),
            }));
        }

        let delay = if failure.external {
            self.policy.delay(done.attempt)
        } else {
            Duration::ZERO
        };
        warn!(
            task_id = %task.id,
            attempt = done.attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %failure.reason,
            "task attempt failed, retrying"
        );
        self.transition(position, TaskState::Running).await?;
        self.retry_at.insert(position, Instant::now() + delay);
        Ok(None)
    }

    /// Commit buffered results at the cursor, in graph order.
    async fn commit_ready(&mut self) -> Result<Option<End>, StateError> {
        let graph = self.graph;
        while let Some(content) = self.buffer.remove(&self.cursor) {
            let position = self.cursor;
            let task = &graph.tasks()[position];

            if let Err(e) = self.persist(&task.path, &content).await {
                error!(task_id = %task.id, path = %task.path, error = %e, "failed to persist file");
                self.transition(position, TaskState::Failed).await?;
                self.record_failure(position, e.to_string()).await;
                return Ok(Some(End::Failed {
                    task_id: task.id.clone(),
                    error: format!("failed to persist {}: {e}", task.path),
                }));
            }

            let entry = self.workspace.commit(&task.id, &task.path, content);
            let event = RunEvent::Committed {
                task_id: task.id.clone(),
                path: task.path.clone(),
                digest: entry.digest.clone(),
                bytes: entry.content.len(),
            };
            self.transition(position, TaskState::Committed).await?;
            self.recorder.record(event).await;
            info!(task_id = %task.id, path = %task.path, "task committed");
            self.cursor += 1;
        }
        Ok(None)
    }

    /// Write through the store, retrying with backoff.
    async fn persist(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let mut attempt = 0u32;
        loop {
            match self.store.write(path, content).await {
                Ok(()) => return Ok(()),
                Err(e) if self.policy.can_retry(attempt) => {
                    let delay = self.policy.delay(attempt);
                    warn!(path, attempt, error = %e, "store write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Abort in-flight attempts, cancel every unfinished task, and build
    /// the outcome.
    async fn finish(mut self, end: End) -> PipelineOutcome {
        let deadline = Instant::now() + self.config.drain_timeout;
        for handle in self.in_flight.values() {
            handle.abort();
        }
        let handles: Vec<JoinHandle<()>> = self.in_flight.drain().map(|(_, h)| h).collect();
        let draining = handles.len();
        if tokio::time::timeout_at(deadline, join_all(handles)).await.is_err() {
            warn!(draining, "drain timeout expired with tasks still in flight");
        }
        self.retry_at.clear();
        self.buffer.clear();

        for position in self.table.unfinished() {
            if let Err(e) = self.transition(position, TaskState::Cancelled).await {
                warn!(error = %e, "could not cancel task");
            }
        }

        let (status, failed_task_id, error) = match end {
            End::Success => (RunStatus::Success, None, None),
            End::Failed { task_id, error } => (RunStatus::Failure, Some(task_id), Some(error)),
            End::Cancelled => (RunStatus::Cancelled, None, None),
        };
        self.recorder
            .record(RunEvent::RunFinished {
                status,
                failed_task_id: failed_task_id.clone(),
            })
            .await;
        info!(
            run_id = %self.recorder.run_id(),
            %status,
            committed = self.workspace.committed_count(),
            "pipeline finished"
        );

        let run_id = self.recorder.run_id();
        let task_states = self.table.states();
        let (records, run_log) = self.recorder.into_parts();
        PipelineOutcome {
            run_id,
            status,
            workspace: self.workspace.into_entries(),
            failed_task_id,
            task_states,
            error,
            records,
            run_log,
        }
    }
}
