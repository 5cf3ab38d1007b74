//! Prompt builders for the planner, architect, and coder stages.
//!
//! Pure string assembly; no I/O.

use std::fmt;
use std::str::FromStr;

use crate::executor::{ExecutionRequest, FailureNote};
use crate::plan::Plan;

/// Maximum bytes of a failure reason or file body quoted back to the model.
const FEEDBACK_SNIPPET_MAX: usize = 2048;
const FILE_BODY_MAX: usize = 64 * 1024;

const JSON_ONLY_RULES: &str = "## Output rules\n\n\
- Follow the JSON schema EXACTLY.\n\
- Respond ONLY with a single valid JSON object.\n\
- Do NOT include explanations, tables, or prose outside the JSON.\n";

/// The three model-backed stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planner,
    Architect,
    Coder,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Planner, Stage::Architect, Stage::Coder];

    /// The stage's system prompt.
    pub fn system_prompt(self) -> String {
        match self {
            Self::Planner => planner_system_prompt(),
            Self::Architect => architect_system_prompt(),
            Self::Coder => coder_system_prompt(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planner => "planner",
            Self::Architect => "architect",
            Self::Coder => "coder",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageParseError(pub String);

impl fmt::Display for StageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid stage: {:?} (expected planner, architect, or coder)", self.0)
    }
}

impl std::error::Error for StageParseError {}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planner" => Ok(Self::Planner),
            "architect" => Ok(Self::Architect),
            "coder" => Ok(Self::Coder),
            other => Err(StageParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

pub fn planner_system_prompt() -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str("# Planner\n\n");
    prompt.push_str(
        "You are the PLANNER. Convert the user request into a COMPLETE project plan: \
         every file the project needs, each with a one-sentence purpose.\n\n",
    );
    prompt.push_str("## Plan guidelines\n\n");
    prompt.push_str("1. Use relative paths only. Never use `..` or absolute paths.\n");
    prompt.push_str("2. List files so that foundations (shared helpers, types) come first.\n");
    prompt.push_str(
        "3. Use `depends_on` to name other planned files a file builds on. \
         Never list a file as its own dependency.\n",
    );
    prompt.push_str("4. Keep the plan minimal: no files the request does not need.\n\n");
    prompt.push_str(JSON_ONLY_RULES);
    prompt
}

pub fn planner_prompt(user_request: &str) -> String {
    let mut prompt = String::with_capacity(user_request.len() + 128);
    prompt.push_str("## User request\n\n");
    prompt.push_str(user_request.trim());
    prompt.push_str("\n\nProduce the project plan.\n");
    prompt
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

pub fn architect_system_prompt() -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str("# Architect\n\n");
    prompt.push_str(
        "You are the ARCHITECT. Break the project plan into explicit implementation \
         tasks that a coder will execute one at a time.\n\n",
    );
    prompt.push_str("## Task rules\n\n");
    prompt.push_str("1. Every file in the plan is covered by one or more tasks.\n");
    prompt.push_str(
        "2. Each task names exactly what to implement: functions, classes, variables, \
         and constants, with their intended signatures.\n",
    );
    prompt.push_str(
        "3. A task lists the ids of the earlier tasks it depends on in `depends_on`, \
         and in `uses` every symbol it takes from them.\n",
    );
    prompt.push_str(
        "4. Several tasks may target the same file. They run in the order you declare \
         them, and each must keep what the earlier ones wrote.\n",
    );
    prompt.push_str(
        "5. `imports` describes the imports the file needs, self-contained, \
         consistent with the symbols of the dependencies.\n",
    );
    prompt.push_str("6. Order tasks so dependencies come first. No cycles.\n\n");
    prompt.push_str(JSON_ONLY_RULES);
    prompt
}

pub fn architect_prompt(plan: &Plan) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str("## Project plan\n\n");
    if !plan.name.is_empty() {
        prompt.push_str(&format!("**Project:** {}\n\n", plan.name));
    }
    for file in &plan.files {
        prompt.push_str(&format!("- `{}`: {}", file.path, file.purpose.trim()));
        if !file.depends_on.is_empty() {
            let deps: Vec<String> = file.depends_on.iter().map(|d| format!("`{d}`")).collect();
            prompt.push_str(&format!(" (depends on {})", deps.join(", ")));
        }
        prompt.push('\n');
    }
    prompt.push_str("\nProduce the implementation tasks.\n");
    prompt
}

// ---------------------------------------------------------------------------
// Coder
// ---------------------------------------------------------------------------

pub fn coder_system_prompt() -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str("# Coder\n\n");
    prompt.push_str(
        "You are the CODER. You implement one engineering task by writing the \
         COMPLETE new content of its target file.\n\n",
    );
    prompt.push_str("## Always\n\n");
    prompt.push_str("- Review the existing files shown to you to maintain compatibility.\n");
    prompt.push_str("- Return the FULL file content, never a diff or a fragment.\n");
    prompt.push_str("- Keep every name and signature of earlier tasks exactly as written.\n");
    prompt.push_str("- Import symbols from dependencies; never re-declare them.\n");
    prompt.push_str(
        "- Preserve everything earlier tasks wrote to the target file.\n\n",
    );
    prompt.push_str(JSON_ONLY_RULES);
    prompt
}

/// The task prompt for one coder attempt: contract, dependency symbols,
/// current file contents, other workspace paths, and prior failures.
pub fn coder_task_prompt(request: &ExecutionRequest) -> String {
    let task = &request.task;
    let snapshot = &request.snapshot;
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(&format!("# Task: {}\n\n", task.id));
    prompt.push_str(&format!("**Target file:** `{}`\n\n", task.path));
    prompt.push_str("## Description\n\n");
    prompt.push_str(task.description.trim());
    prompt.push_str("\n\n");

    if !task.symbols.is_empty() {
        prompt.push_str("## Symbols to define\n\n");
        for symbol in &task.symbols {
            prompt.push_str(&format!("- {symbol}\n"));
        }
        prompt.push('\n');
    }

    if !task.imports.is_empty() {
        prompt.push_str("## Imports\n\n");
        for import in &task.imports {
            prompt.push_str(&format!("- {import}\n"));
        }
        prompt.push('\n');
    }

    if !request.dependencies.is_empty() {
        prompt.push_str("## Dependencies\n\n");
        prompt.push_str(
            "These symbols already exist. Reference them with exactly these names and signatures.\n\n",
        );
        for dep in &request.dependencies {
            prompt.push_str(&format!("### `{}` (task {})\n\n", dep.path, dep.id));
            for symbol in &dep.symbols {
                prompt.push_str(&format!("- {symbol}\n"));
            }
            let used: Vec<&str> = task
                .uses
                .iter()
                .filter(|u| u.task == dep.id)
                .map(|u| u.name.as_str())
                .collect();
            if !used.is_empty() {
                prompt.push_str(&format!("- **You use:** {}\n", used.join(", ")));
            }
            prompt.push('\n');
        }
    }

    if let Some(current) = snapshot.content(&task.path) {
        prompt.push_str("## Current content of the target file\n\n");
        if !request.earlier_on_path.is_empty() {
            let ids: Vec<&str> = request.earlier_on_path.iter().map(|t| t.id.as_str()).collect();
            prompt.push_str(&format!(
                "Written by earlier tasks ({}). Keep all of it.\n\n",
                ids.join(", ")
            ));
        }
        push_file_block(&mut prompt, current);
    }

    let mut dep_paths: Vec<&str> = Vec::new();
    for dep in &request.dependencies {
        if dep.path != task.path && !dep_paths.contains(&dep.path.as_str()) {
            dep_paths.push(dep.path.as_str());
        }
    }
    for path in &dep_paths {
        if let Some(content) = snapshot.content(path) {
            prompt.push_str(&format!("## Existing file `{path}`\n\n"));
            push_file_block(&mut prompt, content);
        }
    }

    let others: Vec<&str> = snapshot
        .paths()
        .filter(|p| *p != task.path && !dep_paths.contains(p))
        .collect();
    if !others.is_empty() {
        prompt.push_str("## Other files in the workspace\n\n");
        for path in others {
            prompt.push_str(&format!("- `{path}`\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&failure_feedback(&request.prior_failures));
    prompt
}

/// Previous-attempt feedback section; empty when there are no failures.
pub fn failure_feedback(notes: &[FailureNote]) -> String {
    if notes.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str("## Previous Attempt Feedback\n\n");
    out.push_str(&format!(
        "{} earlier attempt(s) were rejected. Fix these problems:\n\n",
        notes.len()
    ));
    for note in notes {
        out.push_str(&format!("### Attempt {}\n\n", note.attempt));
        out.push_str("```\n");
        out.push_str(&truncate_snippet(note.reason.trim(), FEEDBACK_SNIPPET_MAX));
        out.push_str("\n```\n\n");
    }
    out
}

fn push_file_block(prompt: &mut String, content: &str) {
    prompt.push_str("```\n");
    prompt.push_str(&truncate_snippet(content, FILE_BODY_MAX));
    if !content.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n\n");
}

/// Truncate to at most `max_bytes`, appending "..." if truncated.
fn truncate_snippet(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_owned();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ImplementationTask, SymbolKind, SymbolSpec};
    use crate::plan::FileSpec;
    use crate::workspace::Workspace;

    #[test]
    fn stage_names_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
            assert!(!stage.system_prompt().is_empty());
        }
        assert!("reviewer".parse::<Stage>().is_err());
    }

    #[test]
    fn planner_prompt_contains_request() {
        let prompt = planner_prompt("  Build a todo app  ");
        assert!(prompt.contains("Build a todo app\n"));
        assert!(planner_system_prompt().contains("JSON"));
    }

    #[test]
    fn architect_prompt_lists_files_and_dependencies() {
        let plan = Plan::new(
            "todo",
            vec![
                FileSpec::new("utils.py", "helpers"),
                FileSpec::new("app.py", "entry point").depending_on(&["utils.py"]),
            ],
        );
        let prompt = architect_prompt(&plan);
        assert!(prompt.contains("**Project:** todo"));
        assert!(prompt.contains("- `utils.py`: helpers\n"));
        assert!(prompt.contains("- `app.py`: entry point (depends on `utils.py`)\n"));
    }

    #[test]
    fn coder_prompt_includes_contract_and_context() {
        let utils = ImplementationTask::new("utils", "utils.py", "helpers").with_symbol(
            SymbolSpec::new("add", SymbolKind::Function).with_signature("add(a: int, b: int) -> int"),
        );
        let app = ImplementationTask::new("app", "app.py", "print the sum")
            .depending_on(&["utils"])
            .using("utils", "add")
            .with_import("from utils import add");

        let mut ws = Workspace::new();
        ws.commit("utils", "utils.py", "def add(a: int, b: int) -> int:\n    return a + b\n".into());
        ws.commit("readme", "README.md", "# todo\n".into());

        let request = ExecutionRequest {
            task: app,
            dependencies: vec![utils],
            earlier_on_path: vec![],
            snapshot: ws.snapshot(),
            attempt: 1,
            prior_failures: vec![FailureNote {
                attempt: 0,
                reason: "symbol `add` missing".to_string(),
            }],
        };
        let prompt = coder_task_prompt(&request);
        assert!(prompt.contains("# Task: app"));
        assert!(prompt.contains("function `add(a: int, b: int) -> int`"));
        assert!(prompt.contains("**You use:** add"));
        assert!(prompt.contains("## Existing file `utils.py`"));
        assert!(prompt.contains("return a + b"));
        assert!(prompt.contains("- `README.md`"));
        assert!(prompt.contains("## Previous Attempt Feedback"));
        assert!(prompt.contains("symbol `add` missing"));
        assert!(!prompt.contains("Current content of the target file"));
    }

    #[test]
    fn failure_feedback_empty_without_notes() {
        assert_eq!(failure_feedback(&[]), "");
    }

    #[test]
    fn truncate_snippet_respects_char_boundaries() {
        assert_eq!(truncate_snippet("hello", 10), "hello");
        assert_eq!(truncate_snippet("héllo", 2), "h...");
    }
}
