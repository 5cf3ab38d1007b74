//! Errors that stop a pipeline before or outside task execution.
//!
//! Task-level failures never show up here: they are retried inside the
//! task boundary and, once exhausted, reported through
//! [`crate::PipelineOutcome`].

use thiserror::Error;

use wright_store::StoreError;

use crate::graph::GraphValidationError;
use crate::model::{ModelError, StructuredError};
use crate::plan::PlanValidationError;

/// Errors surfaced by the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid plan: {0}")]
    Plan(#[from] PlanValidationError),

    #[error("invalid task graph: {0}")]
    Graph(#[from] GraphValidationError),

    #[error("{stage} stage failed after {attempts} attempt(s): {source}")]
    Stage {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    #[error("run log error: {0}")]
    RunLog(#[from] StoreError),
}

impl PipelineError {
    /// Map the final error of a model-backed stage. Domain rule violations
    /// keep their own type; model failures are tagged with the stage.
    pub fn from_stage<E>(stage: &'static str, err: StructuredError<E>) -> Self
    where
        E: Into<PipelineError>,
    {
        match err {
            StructuredError::Model { attempts, source } => Self::Stage {
                stage,
                attempts,
                source,
            },
            StructuredError::Invalid { source, .. } => source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_keep_domain_type() {
        let err = PipelineError::from_stage(
            "planner",
            StructuredError::Invalid {
                attempts: 4,
                source: PlanValidationError::NoFiles,
            },
        );
        assert!(matches!(err, PipelineError::Plan(PlanValidationError::NoFiles)));

        let err = PipelineError::from_stage::<PlanValidationError>(
            "planner",
            StructuredError::Model {
                attempts: 4,
                source: ModelError::Refused("nope".into()),
            },
        );
        assert_eq!(
            err.to_string(),
            "planner stage failed after 4 attempt(s): model reported an error: nope"
        );
    }
}
