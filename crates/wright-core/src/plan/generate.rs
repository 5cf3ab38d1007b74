//! Planner stage: derive a [`Plan`] from a user request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::model::{Plan, PlanValidationError};
use crate::error::PipelineError;
use crate::model::schema::{PLAN_SCHEMA, plan_schema};
use crate::model::{ModelRequest, ModelService, Rejection, invoke_structured};
use crate::prompts::{planner_prompt, planner_system_prompt};
use crate::retry::RetryPolicy;

/// Produces a validated plan for a request.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, user_request: &str) -> Result<Plan, PipelineError>;
}

/// Planner backed by a [`ModelService`]. Malformed or invalid replies are
/// retried with feedback; after the last attempt an invalid plan surfaces
/// as [`PipelineError::Plan`].
pub struct ModelPlanner {
    model: Arc<dyn ModelService>,
    policy: RetryPolicy,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn ModelService>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn request(user_request: &str) -> ModelRequest {
        ModelRequest {
            system: planner_system_prompt(),
            prompt: planner_prompt(user_request),
            schema_name: PLAN_SCHEMA.to_string(),
            schema: plan_schema(),
        }
    }
}

#[async_trait]
impl Planner for ModelPlanner {
    async fn plan(&self, user_request: &str) -> Result<Plan, PipelineError> {
        let request = Self::request(user_request);
        let accept = |value: Value| -> Result<Plan, Rejection<PlanValidationError>> {
            let plan: Plan = serde_json::from_value(value)
                .map_err(|e| Rejection::Malformed(e.to_string()))?;
            plan.validate().map_err(Rejection::Invalid)?;
            Ok(plan)
        };
        let plan = invoke_structured(self.model.as_ref(), &request, &self.policy, accept)
            .await
            .map_err(|e| PipelineError::from_stage("planner", e))?;

        info!(name = %plan.name, files = plan.files.len(), "plan ready");
        Ok(plan)
    }
}

/// Planner that returns a fixed plan, e.g. one read from disk.
#[derive(Debug, Clone)]
pub struct StaticPlanner(pub Plan);

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _user_request: &str) -> Result<Plan, PipelineError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FileSpec;

    #[tokio::test]
    async fn static_planner_validates() {
        let planner = StaticPlanner(Plan::new("empty", vec![]));
        let err = planner.plan("anything").await.unwrap_err();
        assert!(matches!(err, PipelineError::Plan(PlanValidationError::NoFiles)));

        let plan = Plan::new("one", vec![FileSpec::new("a.py", "a")]);
        let planner = StaticPlanner(plan.clone());
        assert_eq!(planner.plan("anything").await.unwrap(), plan);
    }

    #[test]
    fn request_carries_plan_schema() {
        let request = ModelPlanner::request("Build a todo app");
        assert_eq!(request.schema_name, "plan");
        assert!(request.prompt.contains("Build a todo app"));
        assert_eq!(request.schema["required"][0], "files");
    }
}
