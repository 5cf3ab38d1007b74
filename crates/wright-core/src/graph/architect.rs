//! Architect stage: expand a plan into implementation task drafts.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::builder::{GraphValidationError, TaskGraph, build_task_graph};
use super::task::ImplementationTask;
use crate::error::PipelineError;
use crate::model::schema::{TASK_GRAPH_SCHEMA, task_graph_schema};
use crate::model::{ModelRequest, ModelService, Rejection, invoke_structured};
use crate::plan::Plan;
use crate::prompts::{architect_prompt, architect_system_prompt};
use crate::retry::RetryPolicy;

/// Produces task drafts for a validated plan.
#[async_trait]
pub trait Architect: Send + Sync {
    async fn draft_tasks(&self, plan: &Plan) -> Result<Vec<ImplementationTask>, PipelineError>;

    /// Draft tasks and build the ordered graph.
    async fn build_graph(&self, plan: &Plan) -> Result<TaskGraph, PipelineError> {
        plan.validate()?;
        let drafts = self.draft_tasks(plan).await?;
        let graph = build_task_graph(plan, drafts)?;
        info!(tasks = graph.len(), order = ?graph.order(), "task graph ready");
        Ok(graph)
    }
}

/// Deterministic architect: one task per file, id equal to the path, file
/// dependencies mirrored as task dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileArchitect;

impl FileArchitect {
    pub fn drafts(plan: &Plan) -> Vec<ImplementationTask> {
        plan.files
            .iter()
            .map(|file| ImplementationTask {
                id: file.path.clone(),
                path: file.path.clone(),
                description: file.purpose.clone(),
                symbols: Vec::new(),
                uses: Vec::new(),
                depends_on: file.depends_on.clone(),
                imports: Vec::new(),
            })
            .collect()
    }
}

#[async_trait]
impl Architect for FileArchitect {
    async fn draft_tasks(&self, plan: &Plan) -> Result<Vec<ImplementationTask>, PipelineError> {
        Ok(Self::drafts(plan))
    }
}

#[derive(Debug, Deserialize)]
struct TaskDrafts {
    tasks: Vec<ImplementationTask>,
}

/// Architect backed by a [`ModelService`]. Drafts that do not form a valid
/// graph are rejected and retried with feedback.
pub struct ModelArchitect {
    model: Arc<dyn ModelService>,
    policy: RetryPolicy,
}

impl ModelArchitect {
    pub fn new(model: Arc<dyn ModelService>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn request(plan: &Plan) -> ModelRequest {
        ModelRequest {
            system: architect_system_prompt(),
            prompt: architect_prompt(plan),
            schema_name: TASK_GRAPH_SCHEMA.to_string(),
            schema: task_graph_schema(),
        }
    }
}

#[async_trait]
impl Architect for ModelArchitect {
    async fn draft_tasks(&self, plan: &Plan) -> Result<Vec<ImplementationTask>, PipelineError> {
        let request = Self::request(plan);
        let accept = |value: Value| -> Result<Vec<ImplementationTask>, Rejection<GraphValidationError>> {
            let drafts: TaskDrafts = serde_json::from_value(value)
                .map_err(|e| Rejection::Malformed(e.to_string()))?;
            build_task_graph(plan, drafts.tasks.clone()).map_err(Rejection::Invalid)?;
            Ok(drafts.tasks)
        };
        invoke_structured(self.model.as_ref(), &request, &self.policy, accept)
            .await
            .map_err(|e| PipelineError::from_stage("architect", e))
    }
}
