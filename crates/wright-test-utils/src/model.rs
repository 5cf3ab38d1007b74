use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use wright_core::model::{ModelError, ModelRequest, ModelService};

/// Replays queued replies, keyed by the request's schema name. An empty
/// queue answers `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<String, VecDeque<Result<Value, ModelError>>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for `schema`.
    pub fn reply(self, schema: &str, value: Value) -> Self {
        self.push(schema, Ok(value))
    }

    /// Queue a failure for `schema`.
    pub fn fail(self, schema: &str, err: ModelError) -> Self {
        self.push(schema, Err(err))
    }

    fn push(self, schema: &str, reply: Result<Value, ModelError>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests received for `schema`.
    pub fn requests_for(&self, schema: &str) -> Vec<ModelRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.schema_name == schema)
            .collect()
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .get_mut(&request.schema_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ModelError::Unavailable(format!(
                    "no scripted reply for {}",
                    request.schema_name
                )))
            })
    }
}
