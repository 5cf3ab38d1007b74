//! Small plans, graphs, and configs shared by integration tests.

use std::time::Duration;

use serde_json::{Value, json};

use wright_core::graph::{FileArchitect, ImplementationTask, SymbolKind, SymbolSpec};
use wright_core::{FileSpec, Plan, PipelineConfig, TaskGraph, build_task_graph};

/// `utils.py` then `app.py`, where the app builds on the helpers.
pub fn two_file_plan() -> Plan {
    Plan::new(
        "todo",
        vec![
            FileSpec::new("utils.py", "helper functions"),
            FileSpec::new("app.py", "entry point").depending_on(&["utils.py"]),
        ],
    )
}

/// Tasks for [`two_file_plan`]: `utils` declares `add`, `app` uses it.
pub fn two_file_tasks() -> Vec<ImplementationTask> {
    vec![
        ImplementationTask::new("app", "app.py", "entry point")
            .with_symbol(SymbolSpec::new("main", SymbolKind::Function))
            .using("utils", "add")
            .depending_on(&["utils"]),
        ImplementationTask::new("utils", "utils.py", "helpers").with_symbol(
            SymbolSpec::new("add", SymbolKind::Function).with_signature("def add(a, b)"),
        ),
    ]
}

pub fn two_file_graph() -> TaskGraph {
    build_task_graph(&two_file_plan(), two_file_tasks()).unwrap()
}

/// `f0.py` .. `f{n-1}.py`, each depending on the previous one.
pub fn chain_plan(n: usize) -> Plan {
    let files = (0..n)
        .map(|i| {
            let file = FileSpec::new(format!("f{i}.py"), format!("step {i}"));
            if i == 0 {
                file
            } else {
                file.depending_on(&[&format!("f{}.py", i - 1)])
            }
        })
        .collect();
    Plan::new("chain", files)
}

pub fn chain_graph(n: usize) -> TaskGraph {
    let plan = chain_plan(n);
    build_task_graph(&plan, FileArchitect::drafts(&plan)).unwrap()
}

/// `n` files with no dependencies between them.
pub fn independent_graph(n: usize) -> TaskGraph {
    let plan = Plan::new(
        "flat",
        (0..n)
            .map(|i| FileSpec::new(format!("m{i}.py"), format!("module {i}")))
            .collect(),
    );
    build_task_graph(&plan, FileArchitect::drafts(&plan)).unwrap()
}

/// Default config with millisecond backoff.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        drain_timeout: Duration::from_secs(1),
        ..PipelineConfig::default()
    }
}

/// Planner reply for [`two_file_plan`].
pub fn two_file_plan_reply() -> Value {
    json!({
        "name": "todo",
        "files": [
            {"path": "utils.py", "purpose": "helper functions"},
            {"path": "app.py", "purpose": "entry point", "depends_on": ["utils.py"]}
        ]
    })
}

/// Architect reply for [`two_file_plan`].
pub fn two_file_tasks_reply() -> Value {
    json!({
        "tasks": [
            {
                "id": "app",
                "path": "app.py",
                "description": "entry point",
                "symbols": [{"name": "main", "kind": "function"}],
                "uses": [{"task": "utils", "name": "add"}],
                "depends_on": ["utils"]
            },
            {
                "id": "utils",
                "path": "utils.py",
                "description": "helpers",
                "symbols": [{"name": "add", "kind": "function", "signature": "def add(a, b)"}]
            }
        ]
    })
}
