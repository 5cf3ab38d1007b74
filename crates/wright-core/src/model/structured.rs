//! Bounded retry around a structured model call.
//!
//! Each attempt's rejection reason is appended to the next prompt as
//! previous-attempt feedback. External failures back off first.

use std::fmt::Display;

use serde_json::Value;
use tracing::{debug, warn};

use super::trait_def::{ModelError, ModelRequest, ModelService};
use crate::executor::FailureNote;
use crate::prompts::failure_feedback;
use crate::retry::RetryPolicy;

/// Why a model reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection<E> {
    /// The reply did not have the expected shape.
    Malformed(String),
    /// The reply parsed but broke a domain rule.
    Invalid(E),
}

/// Final error after every attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredError<E> {
    /// The last attempt failed at the model boundary.
    Model { attempts: u32, source: ModelError },
    /// The last attempt produced a value that broke a domain rule.
    Invalid { attempts: u32, source: E },
}

/// Invoke `model` until `accept` takes the reply or the policy runs out of
/// attempts.
pub async fn invoke_structured<T, E, F>(
    model: &dyn ModelService,
    request: &ModelRequest,
    policy: &RetryPolicy,
    mut accept: F,
) -> Result<T, StructuredError<E>>
where
    E: Display,
    F: FnMut(Value) -> Result<T, Rejection<E>>,
{
    let mut notes: Vec<FailureNote> = Vec::new();
    let mut attempt_request = request.clone();
    let mut attempt = 0u32;

    loop {
        debug!(schema = %request.schema_name, attempt, "invoking model");
        let last = match model.invoke(&attempt_request).await {
            Ok(value) => match accept(value) {
                Ok(accepted) => return Ok(accepted),
                Err(Rejection::Malformed(reason)) => StructuredError::Model {
                    attempts: attempt + 1,
                    source: ModelError::Malformed {
                        schema: request.schema_name.clone(),
                        reason,
                    },
                },
                Err(Rejection::Invalid(e)) => StructuredError::Invalid {
                    attempts: attempt + 1,
                    source: e,
                },
            },
            Err(e) => StructuredError::Model {
                attempts: attempt + 1,
                source: e,
            },
        };

        let (reason, external) = match &last {
            StructuredError::Model { source, .. } => (source.to_string(), source.is_external()),
            StructuredError::Invalid { source, .. } => (source.to_string(), false),
        };

        if !policy.can_retry(attempt) {
            return Err(last);
        }

        warn!(
            schema = %request.schema_name,
            attempt,
            reason = %reason,
            "model reply rejected, retrying"
        );
        if external {
            tokio::time::sleep(policy.delay(attempt)).await;
        }

        notes.push(FailureNote { attempt, reason });
        attempt_request.prompt = format!("{}\n\n{}", request.prompt, failure_feedback(&notes));
        attempt += 1;
    }
}
