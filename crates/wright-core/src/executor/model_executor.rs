//! Model-backed coder: one model call per attempt.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    ExecutionRequest, ExecutorError, TaskExecutor, TaskResult, TransientFailure,
    ensure_dependencies_committed,
};
use crate::model::schema::{FILE_CONTENT_SCHEMA, file_content_schema};
use crate::model::{ModelRequest, ModelService};
use crate::prompts::{coder_system_prompt, coder_task_prompt};

#[derive(Debug, Deserialize)]
struct FileContent {
    path: String,
    content: String,
}

/// [`TaskExecutor`] that asks a [`ModelService`] for the full file.
pub struct ModelExecutor {
    model: Arc<dyn ModelService>,
}

impl ModelExecutor {
    pub fn new(model: Arc<dyn ModelService>) -> Self {
        Self { model }
    }

    pub fn request(execution: &ExecutionRequest) -> ModelRequest {
        ModelRequest {
            system: coder_system_prompt(),
            prompt: coder_task_prompt(execution),
            schema_name: FILE_CONTENT_SCHEMA.to_string(),
            schema: file_content_schema(),
        }
    }
}

#[async_trait]
impl TaskExecutor for ModelExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<TaskResult, ExecutorError> {
        ensure_dependencies_committed(&request)?;

        let task = &request.task;
        debug!(task_id = %task.id, attempt = request.attempt, path = %task.path, "invoking coder");

        let value = self
            .model
            .invoke(&Self::request(&request))
            .await
            .map_err(|e| {
                if e.is_external() {
                    TransientFailure::external(e.to_string())
                } else {
                    TransientFailure::output(e.to_string())
                }
            })?;

        let reply: FileContent = match serde_json::from_value(value) {
            Ok(reply) => reply,
            Err(e) => return Ok(TaskResult::failed(task, format!("malformed reply: {e}"))),
        };

        if reply.path.trim() != task.path {
            return Ok(TaskResult::failed(
                task,
                format!(
                    "reply targets {:?} but the task's file is {:?}",
                    reply.path, task.path
                ),
            ));
        }
        if reply.content.trim().is_empty() {
            return Ok(TaskResult::failed(task, "reply content is empty"));
        }

        Ok(TaskResult::success(task, reply.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use crate::executor::{FatalError, ResultStatus};
    use crate::graph::ImplementationTask;
    use crate::model::ModelError;
    use crate::workspace::{Workspace, WorkspaceSnapshot};

    struct OneReply(Mutex<Option<Result<Value, ModelError>>>);

    #[async_trait]
    impl ModelService for OneReply {
        fn name(&self) -> &str {
            "one-reply"
        }

        async fn invoke(&self, _request: &ModelRequest) -> Result<Value, ModelError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ModelError::Unavailable("exhausted".into())))
        }
    }

    fn executor(reply: Result<Value, ModelError>) -> ModelExecutor {
        ModelExecutor::new(Arc::new(OneReply(Mutex::new(Some(reply)))))
    }

    fn request(task: ImplementationTask, snapshot: WorkspaceSnapshot) -> ExecutionRequest {
        ExecutionRequest {
            task,
            dependencies: vec![],
            earlier_on_path: vec![],
            snapshot,
            attempt: 0,
            prior_failures: vec![],
        }
    }

    #[tokio::test]
    async fn returns_full_content() {
        let exec = executor(Ok(json!({"path": "utils.py", "content": "def add(a, b):\n    return a + b\n"})));
        let task = ImplementationTask::new("utils", "utils.py", "helpers");
        let result = exec
            .execute(request(task, WorkspaceSnapshot::default()))
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        assert!(result.content.contains("return a + b"));
    }

    #[tokio::test]
    async fn wrong_path_or_empty_content_fails_the_attempt() {
        let task = ImplementationTask::new("utils", "utils.py", "helpers");

        let exec = executor(Ok(json!({"path": "other.py", "content": "x = 1"})));
        let result = exec
            .execute(request(task.clone(), WorkspaceSnapshot::default()))
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
        assert!(result.failure.unwrap().contains("other.py"));

        let exec = executor(Ok(json!({"path": "utils.py", "content": "  \n"})));
        let result = exec
            .execute(request(task, WorkspaceSnapshot::default()))
            .await
            .unwrap();
        assert_eq!(result.failure.as_deref(), Some("reply content is empty"));
    }

    #[tokio::test]
    async fn model_errors_are_transient() {
        let task = ImplementationTask::new("utils", "utils.py", "helpers");
        let exec = executor(Err(ModelError::Unavailable("down".into())));
        let err = exec
            .execute(request(task, WorkspaceSnapshot::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Transient(ref t) if t.external));
    }

    #[tokio::test]
    async fn uncommitted_dependency_is_fatal_before_any_call() {
        let task = ImplementationTask::new("app", "app.py", "entry").depending_on(&["utils"]);
        let exec = executor(Ok(json!({"path": "app.py", "content": "print(1)"})));
        let err = exec
            .execute(request(task.clone(), WorkspaceSnapshot::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Fatal(FatalError::MissingDependency { .. })
        ));

        let mut ws = Workspace::new();
        ws.commit("utils", "utils.py", "x = 1\n".into());
        let result = exec.execute(request(task, ws.snapshot())).await.unwrap();
        assert!(result.is_success());
    }
}
