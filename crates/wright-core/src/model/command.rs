//! Subprocess model backend.
//!
//! Runs a CLI such as `claude -p --output-format json`, passing the system
//! prompt as a flag and the task prompt plus the output schema on stdin.
//! The JSON object in the reply is extracted and checked against the
//! schema before it is returned.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::schema::first_violation;
use super::trait_def::{ModelError, ModelRequest, ModelService};

pub const DEFAULT_PROGRAM: &str = "claude";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How to launch the backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandModelConfig {
    /// Registry name of the backend.
    pub name: String,
    /// Executable, looked up on `$PATH` when not absolute.
    pub program: String,
    /// Arguments passed before the system prompt flag.
    pub args: Vec<String>,
    /// Flag that introduces the system prompt; omitted when `None`, in which
    /// case the system prompt is prepended to stdin.
    pub system_flag: Option<String>,
    /// Wall-clock limit for one call.
    pub timeout: Duration,
}

impl Default for CommandModelConfig {
    fn default() -> Self {
        Self {
            name: "claude-code".to_string(),
            program: DEFAULT_PROGRAM.to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "json".to_string(),
            ],
            system_flag: Some("--append-system-prompt".to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// [`ModelService`] implemented by a child process per call.
#[derive(Debug, Clone)]
pub struct CommandModel {
    config: CommandModelConfig,
}

impl CommandModel {
    pub fn new(config: CommandModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandModelConfig {
        &self.config
    }

    fn stdin_payload(&self, request: &ModelRequest) -> String {
        let mut payload = String::new();
        if self.config.system_flag.is_none() {
            payload.push_str(&request.system);
            payload.push_str("\n\n");
        }
        payload.push_str(&request.prompt);
        payload.push_str("\n\n## Output format\n\n");
        payload.push_str(
            "Respond with a single JSON object and nothing else. It must conform to this JSON Schema:\n\n",
        );
        payload.push_str(
            &serde_json::to_string_pretty(&request.schema).unwrap_or_else(|_| "{}".to_string()),
        );
        payload.push('\n');
        payload
    }

    async fn run_process(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        if let Some(flag) = &self.config.system_flag {
            cmd.arg(flag).arg(&request.system);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ModelError::Unavailable(format!(
                "failed to spawn '{}' -- is it installed and on PATH? ({e})",
                self.config.program
            ))
        })?;

        let payload = self.stdin_payload(request);
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    warn!(error = %e, "failed to write prompt to model stdin");
                }
            });
        }

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| ModelError::Timeout(self.config.timeout))?
            .map_err(|e| ModelError::Unavailable(format!("waiting for model process: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ModelError::Unavailable(format!(
                "'{}' exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ModelError::Unavailable("model output is not valid UTF-8".to_string()))
    }
}

impl Default for CommandModel {
    fn default() -> Self {
        Self::new(CommandModelConfig::default())
    }
}

#[async_trait]
impl ModelService for CommandModel {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        debug!(
            program = %self.config.program,
            schema = %request.schema_name,
            "invoking model process"
        );
        let stdout = self.run_process(request).await?;
        let value = parse_reply(&stdout, &request.schema_name)?;
        if let Some(reason) = first_violation(&request.schema, &value) {
            return Err(ModelError::Malformed {
                schema: request.schema_name.clone(),
                reason,
            });
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Turn raw stdout into the structured value.
///
/// Accepts either a result envelope (`{"type":"result","result":"..."}`)
/// whose text holds the JSON object, or the JSON object itself.
fn parse_reply(stdout: &str, schema: &str) -> Result<Value, ModelError> {
    let malformed = |reason: String| ModelError::Malformed {
        schema: schema.to_string(),
        reason,
    };

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.get("type").and_then(Value::as_str) == Some("result") {
            let text = value.get("result").and_then(Value::as_str).unwrap_or("");
            if value.get("is_error").and_then(Value::as_bool) == Some(true) {
                return Err(ModelError::Refused(text.to_string()));
            }
            return extract_json_object(text).map_err(malformed);
        }
        return Ok(value);
    }

    extract_json_object(trimmed).map_err(malformed)
}

/// Find the JSON object in free text, tolerating Markdown code fences and
/// surrounding prose.
fn extract_json_object(text: &str) -> Result<Value, String> {
    let body = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
            .map_err(|e| format!("response is not valid JSON: {e}")),
        _ => Err("response contains no JSON object".to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
