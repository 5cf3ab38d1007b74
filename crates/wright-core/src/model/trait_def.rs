//! The `ModelService` trait -- the adapter interface for LLM backends.
//!
//! The trait is object-safe so it can be stored as `Arc<dyn ModelService>`
//! in the [`super::ModelRegistry`] and shared across spawned executor
//! tasks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One structured-output request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Role and rules for the model.
    pub system: String,
    /// The task-specific prompt.
    pub prompt: String,
    /// Name of the output schema, used in error messages.
    pub schema_name: String,
    /// JSON Schema the response must conform to.
    pub schema: Value,
}

/// Errors returned by a [`ModelService`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The backend could not be reached or exited abnormally.
    #[error("model backend unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its wall-clock limit.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The response was not a value conforming to the requested schema.
    #[error("model output does not match schema {schema}: {reason}")]
    Malformed { schema: String, reason: String },

    /// The backend answered with an explicit error.
    #[error("model reported an error: {0}")]
    Refused(String),
}

impl ModelError {
    /// External-call failures back off before the next attempt; output
    /// problems are retried straight away with feedback.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// A fallible, side-effect free structured-output call.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Human-readable backend name (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Send the request and return the structured result.
    async fn invoke(&self, request: &ModelRequest) -> Result<Value, ModelError>;
}

// Compile-time assertion: ModelService must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ModelService) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoModel;

    #[async_trait]
    impl ModelService for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, request: &ModelRequest) -> Result<Value, ModelError> {
            Ok(serde_json::json!({ "prompt": request.prompt }))
        }
    }

    #[tokio::test]
    async fn model_service_is_object_safe() {
        let model: Box<dyn ModelService> = Box::new(EchoModel);
        let request = ModelRequest {
            system: String::new(),
            prompt: "hello".to_string(),
            schema_name: "echo".to_string(),
            schema: serde_json::json!({"type": "object"}),
        };
        let value = model.invoke(&request).await.unwrap();
        assert_eq!(model.name(), "echo");
        assert_eq!(value["prompt"], "hello");
    }

    #[test]
    fn external_failures_are_classified() {
        assert!(ModelError::Unavailable("down".into()).is_external());
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_external());
        assert!(!ModelError::Refused("no".into()).is_external());
        assert!(
            !ModelError::Malformed {
                schema: "plan".into(),
                reason: "missing files".into()
            }
            .is_external()
        );
    }
}
