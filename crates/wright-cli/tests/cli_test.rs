//! Integration tests for the `wright` binary.
//!
//! Each test points `XDG_CONFIG_HOME` at a temporary directory so no real
//! config file is read, and uses a shell script as the model command.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const PLAN: &str = r#"
name = "hello"

[[files]]
path = "main.py"
purpose = "print a greeting"
"#;

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::write(dir.path().join("plan.toml"), PLAN).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self) -> PathBuf {
        self.path().join("out")
    }

    fn plan(&self) -> PathBuf {
        self.path().join("plan.toml")
    }

    #[cfg(unix)]
    fn model_script(&self, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.path().join("fake_model.sh");
        std::fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn wright(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_wright"))
            .args(args)
            .env("XDG_CONFIG_HOME", self.path().join("config"))
            .env("RUST_LOG", "warn")
            .env_remove("WRIGHT_OUTPUT_DIR")
            .env_remove("WRIGHT_MODEL_COMMAND")
            .env_remove("WRIGHT_RETRY_MAX")
            .output()
            .expect("failed to run wright")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// -----------------------------------------------------------------------
// Offline commands
// -----------------------------------------------------------------------

#[test]
fn prompt_prints_stage_system_prompt() {
    let sandbox = Sandbox::new();
    let output = sandbox.wright(&["prompt", "coder"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("JSON"));

    let output = sandbox.wright(&["prompt", "reviewer"]);
    assert!(!output.status.success());
}

#[test]
fn graph_per_file_prints_execution_order() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.plan(),
        r#"
[[files]]
path = "app.py"
purpose = "entry point"
depends_on = ["utils.py"]

[[files]]
path = "utils.py"
purpose = "helpers"
"#,
    )
    .unwrap();

    let output = sandbox.wright(&["graph", sandbox.plan().to_str().unwrap(), "--per-file"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    let utils = text.find("utils.py  ->").expect("utils listed");
    let app = text.find("app.py  ->").expect("app listed");
    assert!(utils < app, "utils must come first:\n{text}");
}

#[test]
fn invalid_plan_file_is_reported() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.plan(), "name = \"empty\"\n").unwrap();
    let output = sandbox.wright(&["graph", sandbox.plan().to_str().unwrap(), "--per-file"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("at least one file"), "stderr: {}", stderr(&output));
}

#[test]
fn init_writes_config_once() {
    let sandbox = Sandbox::new();
    let output = sandbox.wright(&["init"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let written = sandbox.path().join("config/wright/config.toml");
    let text = std::fs::read_to_string(&written).unwrap();
    assert!(text.contains("[pipeline]"));
    assert!(text.contains("retry_max = 3"));

    let output = sandbox.wright(&["init"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--force"));

    let output = sandbox.wright(&["init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn completions_are_generated() {
    let sandbox = Sandbox::new();
    let output = sandbox.wright(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("wright"));
}

// -----------------------------------------------------------------------
// Execution with a fake model
// -----------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn execute_writes_files_and_run_log() {
    let sandbox = Sandbox::new();
    let model = sandbox.model_script(
        r#"printf '%s\n' '{"type":"result","result":"{\"path\": \"main.py\", \"content\": \"print(\\\"hi\\\")\\n\"}"}'"#,
    );
    let out = sandbox.out();

    let output = sandbox.wright(&[
        "execute",
        sandbox.plan().to_str().unwrap(),
        "--per-file",
        "--out",
        out.to_str().unwrap(),
        "--model-command",
        model.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains(": success"));
    assert_eq!(
        std::fs::read_to_string(out.join("main.py")).unwrap(),
        "print(\"hi\")\n"
    );

    let runs: Vec<_> = std::fs::read_dir(out.join(".wright/runs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    let run_id = runs[0].file_stem().unwrap().to_str().unwrap().to_string();

    let output = sandbox.wright(&["log", &run_id, "--out", out.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let log = stdout(&output);
    assert!(log.contains("[main.py] committed main.py"), "log:\n{log}");
    assert!(log.contains("run finished: success"));
}

#[cfg(unix)]
#[test]
fn dry_run_writes_nothing() {
    let sandbox = Sandbox::new();
    let model = sandbox.model_script(r#"printf '%s\n' '{"path": "main.py", "content": "print(1)\n"}'"#);
    let out = sandbox.out();

    let output = sandbox.wright(&[
        "execute",
        sandbox.plan().to_str().unwrap(),
        "--per-file",
        "--dry-run",
        "--out",
        out.to_str().unwrap(),
        "--model-command",
        model.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Dry run: 1 file(s) generated"));
    assert!(!out.exists());
}

#[cfg(unix)]
#[test]
fn failing_model_exits_non_zero() {
    let sandbox = Sandbox::new();
    let model = sandbox.model_script("echo 'backend down' >&2\nexit 2");
    let out = sandbox.out();

    let output = sandbox.wright(&[
        "execute",
        sandbox.plan().to_str().unwrap(),
        "--per-file",
        "--retry-max",
        "0",
        "--out",
        out.to_str().unwrap(),
        "--model-command",
        model.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1), "stdout: {}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("Failed task: main.py"), "stdout: {text}");
    assert!(text.contains("backend down"), "stdout: {text}");
    assert!(!out.join("main.py").exists());
}
