//! `wright log`: print a run's audit trail.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use wright_store::{RunEvent, RunRecord, StoreConfig, read_run_log};

/// Resolve `run` as a log file path, or as a run id under the runs dir.
pub fn resolve_log_path(store: &StoreConfig, run: &str) -> Result<PathBuf> {
    let direct = Path::new(run);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    let id = uuid::Uuid::parse_str(run)
        .with_context(|| format!("{run:?} is neither a log file nor a run id"))?;
    let path = store.run_log_path(id);
    if !path.is_file() {
        bail!("no run log for {id} at {}", path.display());
    }
    Ok(path)
}

/// Execute the `wright log` command.
pub async fn run_log(store: &StoreConfig, run: &str, json: bool) -> Result<()> {
    let path = resolve_log_path(store, run)?;
    let records = read_run_log(&path)
        .await
        .with_context(|| format!("failed to read run log {}", path.display()))?;

    if records.is_empty() {
        println!("(empty run log)");
        return Ok(());
    }
    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", format_record(record));
        }
    }
    Ok(())
}

/// One human-readable line per record.
pub fn format_record(record: &RunRecord) -> String {
    let at = record.at.format("%Y-%m-%d %H:%M:%S%.3f");
    let what = match &record.event {
        RunEvent::RunStarted { request: Some(r) } => format!("run started: {r}"),
        RunEvent::RunStarted { request: None } => "run started".to_string(),
        RunEvent::PlanReady { files } => format!("plan ready: {}", files.join(", ")),
        RunEvent::GraphReady { order } => format!("graph ready: {}", order.join(" -> ")),
        RunEvent::Transition {
            task_id,
            from,
            to,
            attempt,
        } => format!("[{task_id}] {from} -> {to} (attempt {attempt})"),
        RunEvent::AttemptFailed {
            task_id,
            attempt,
            reason,
        } => {
            let first = reason.lines().next().unwrap_or_default();
            format!("[{task_id}] attempt {attempt} failed: {first}")
        }
        RunEvent::Committed {
            task_id,
            path,
            digest,
            bytes,
        } => {
            let short = digest.get(..12).unwrap_or(digest);
            format!("[{task_id}] committed {path} ({bytes} bytes, sha256 {short})")
        }
        RunEvent::RunFinished {
            status,
            failed_task_id: Some(task),
        } => format!("run finished: {status} (failed task {task})"),
        RunEvent::RunFinished {
            status,
            failed_task_id: None,
        } => format!("run finished: {status}"),
    };
    format!("{at}  {what}")
}
