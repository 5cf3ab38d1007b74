//! `wright run`, `wright execute`, `wright plan`, and `wright graph`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wright_core::controller::Pipeline;
use wright_core::executor::ModelExecutor;
use wright_core::graph::{Architect, FileArchitect, ModelArchitect};
use wright_core::model::{CommandModel, ModelRegistry, ModelService};
use wright_core::plan::{ModelPlanner, Planner, parse_plan_toml};
use wright_core::{Plan, PipelineOutcome, TaskGraph};
use wright_store::{DiskStore, FileStore, MemoryStore, RunStatus, TaskState};

use crate::config::WrightConfig;

/// Options shared by `run` and `execute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Keep generated files in memory and write no run log.
    pub dry_run: bool,
    /// Use one task per file instead of the model-backed architect.
    pub per_file: bool,
}

/// Look up the configured model backend.
fn model_service(config: &WrightConfig) -> Result<Arc<dyn ModelService>> {
    let mut registry = ModelRegistry::new();
    registry.register(CommandModel::new(config.model.clone()));
    registry.get(&config.model.name).with_context(|| {
        format!(
            "model backend {:?} is not registered (available: {})",
            config.model.name,
            registry.list().join(", ")
        )
    })
}

fn architect(
    config: &WrightConfig,
    model: &Arc<dyn ModelService>,
    per_file: bool,
) -> Arc<dyn Architect> {
    if per_file {
        Arc::new(FileArchitect)
    } else {
        Arc::new(ModelArchitect::new(
            Arc::clone(model),
            config.pipeline.retry_policy(),
        ))
    }
}

fn pipeline(config: &WrightConfig, options: ExecuteOptions) -> Result<Pipeline> {
    let model = model_service(config)?;
    let store: Arc<dyn FileStore> = if options.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(DiskStore::new(&config.store.output_dir))
    };
    let pipeline = Pipeline::new(
        Arc::new(ModelPlanner::new(
            Arc::clone(&model),
            config.pipeline.retry_policy(),
        )),
        architect(config, &model, options.per_file),
        Arc::new(ModelExecutor::new(model)),
        store,
        config.pipeline.clone(),
    );
    Ok(if options.dry_run {
        pipeline
    } else {
        pipeline.with_run_log(config.store.runs_dir())
    })
}

/// Cancel the returned token on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            child.cancel();
        }
    });
    token
}

/// Execute the `wright run` command.
pub async fn run_request(
    config: &WrightConfig,
    request: &str,
    options: ExecuteOptions,
) -> Result<RunStatus> {
    let pipeline = pipeline(config, options)?;
    info!(out = %config.store.output_dir.display(), dry_run = options.dry_run, "starting run");
    let outcome = pipeline.run(request, cancel_on_ctrl_c()).await?;
    print_outcome(config, &outcome, options);
    Ok(outcome.status)
}

/// Execute the `wright execute` command.
pub async fn run_execute(
    config: &WrightConfig,
    plan_file: &Path,
    options: ExecuteOptions,
) -> Result<RunStatus> {
    let plan = read_plan(plan_file)?;
    let pipeline = pipeline(config, options)?;
    let outcome = pipeline.execute_plan(&plan, cancel_on_ctrl_c()).await?;
    print_outcome(config, &outcome, options);
    Ok(outcome.status)
}

/// Execute the `wright plan` command: run the planner only.
pub async fn run_plan(config: &WrightConfig, request: &str, output: Option<&Path>) -> Result<()> {
    let model = model_service(config)?;
    let planner = ModelPlanner::new(model, config.pipeline.retry_policy());
    let plan = planner.plan(request).await?;
    let text = plan.to_toml().context("failed to serialize plan")?;

    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write plan to {}", path.display()))?;
            println!("Plan with {} file(s) written to {}", plan.files.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Execute the `wright graph` command: build and print the task graph.
pub async fn run_graph(config: &WrightConfig, plan_file: &Path, per_file: bool) -> Result<()> {
    let plan = read_plan(plan_file)?;
    let graph = if per_file {
        FileArchitect.build_graph(&plan).await?
    } else {
        let model = model_service(config)?;
        architect(config, &model, false).build_graph(&plan).await?
    };
    print_graph(&graph);
    Ok(())
}

fn read_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan file {}", path.display()))?;
    parse_plan_toml(&content).with_context(|| format!("invalid plan file {}", path.display()))
}

// -----------------------------------------------------------------------
// Output
// -----------------------------------------------------------------------

pub fn print_graph(graph: &TaskGraph) {
    println!("{} task(s) in execution order:", graph.len());
    for (i, task) in graph.tasks().iter().enumerate() {
        println!("{:>3}. {}  ->  {}", i + 1, task.id, task.path);
        if !task.depends_on.is_empty() {
            println!("       depends on: {}", task.depends_on.join(", "));
        }
        for symbol in &task.symbols {
            println!("       defines {symbol}");
        }
        for used in &task.uses {
            println!("       uses {} from {}", used.name, used.task);
        }
    }
}

fn print_outcome(config: &WrightConfig, outcome: &PipelineOutcome, options: ExecuteOptions) {
    println!("Run {}: {}", outcome.run_id, outcome.status);
    let width = outcome
        .task_states
        .iter()
        .map(|(id, _)| id.len())
        .max()
        .unwrap_or(0);
    for (id, state) in &outcome.task_states {
        println!("  {id:<width$}  {state}");
    }

    if let Some(task) = &outcome.failed_task_id {
        println!("Failed task: {task}");
    }
    if let Some(error) = &outcome.error {
        println!("Error: {error}");
    }

    let committed = outcome.count(TaskState::Committed);
    if options.dry_run {
        println!("Dry run: {committed} file(s) generated, nothing written.");
        for (path, content) in &outcome.workspace {
            println!("  {path} ({} bytes)", content.len());
        }
    } else {
        println!(
            "{} file(s) written to {}",
            outcome.workspace.len(),
            config.store.output_dir.display()
        );
    }
    if let Some(log) = &outcome.run_log {
        println!("Run log: {}", log.display());
    }
}
