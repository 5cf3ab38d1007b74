//! Tests for the on-disk file store and the JSONL run log.

use uuid::Uuid;

use wright_store::{
    DiskStore, FileStore, RunEvent, RunLogWriter, RunRecord, RunStatus, StoreConfig, StoreError,
    TaskState, read_run_log,
};

#[tokio::test]
async fn write_then_read_roundtrips_nested_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path());

    store.write("src/app.py", "print('hi')\n").await.unwrap();

    let on_disk = std::fs::read_to_string(dir.path().join("src/app.py")).unwrap();
    assert_eq!(on_disk, "print('hi')\n");
    assert_eq!(
        store.read("src/app.py").await.unwrap().as_deref(),
        Some("print('hi')\n")
    );
}

#[tokio::test]
async fn read_missing_file_is_none() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path());
    assert_eq!(store.read("nope.py").await.unwrap(), None);
}

#[tokio::test]
async fn write_replaces_whole_file_and_leaves_no_temp_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path());

    store.write("utils.py", "a much longer first version\n").await.unwrap();
    store.write("utils.py", "short\n").await.unwrap();

    assert_eq!(store.read("utils.py").await.unwrap().as_deref(), Some("short\n"));
    assert_eq!(store.list().await.unwrap(), vec!["utils.py"]);
}

#[tokio::test]
async fn list_is_sorted_and_skips_state_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path());

    store.write("b/z.js", "z").await.unwrap();
    store.write("a.js", "a").await.unwrap();
    store.write("b/c/d.js", "d").await.unwrap();
    std::fs::create_dir_all(dir.path().join(".wright/runs")).unwrap();
    std::fs::write(dir.path().join(".wright/runs/x.jsonl"), "{}").unwrap();

    assert_eq!(store.list().await.unwrap(), vec!["a.js", "b/c/d.js", "b/z.js"]);
}

#[tokio::test]
async fn list_on_missing_root_is_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path().join("not-created-yet"));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejects_escaping_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = DiskStore::new(dir.path().join("root"));

    let err = store.write("../outside.txt", "x").await.unwrap_err();
    assert!(matches!(err, StoreError::UnsafePath(_)), "got: {err}");
    assert!(!dir.path().join("outside.txt").exists());
}

#[tokio::test]
async fn run_log_appends_and_reads_back_in_order() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path());
    let run_id = Uuid::new_v4();
    let path = config.run_log_path(run_id);

    let mut writer = RunLogWriter::create(&path).await.unwrap();
    writer
        .append(&RunRecord::now(run_id, RunEvent::RunStarted { request: None }))
        .await
        .unwrap();
    writer
        .append(&RunRecord::now(
            run_id,
            RunEvent::Transition {
                task_id: "utils.py".to_string(),
                from: TaskState::Pending,
                to: TaskState::Running,
                attempt: 0,
            },
        ))
        .await
        .unwrap();
    writer
        .append(&RunRecord::now(
            run_id,
            RunEvent::RunFinished {
                status: RunStatus::Success,
                failed_task_id: None,
            },
        ))
        .await
        .unwrap();

    let records = read_run_log(&path).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.run_id == run_id));
    assert!(matches!(records[0].event, RunEvent::RunStarted { .. }));
    assert!(matches!(
        records[1].event,
        RunEvent::Transition {
            to: TaskState::Running,
            ..
        }
    ));
    assert!(matches!(
        records[2].event,
        RunEvent::RunFinished {
            status: RunStatus::Success,
            ..
        }
    ));
}

#[tokio::test]
async fn run_log_reports_malformed_line_number() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bad.jsonl");
    std::fs::write(&path, "\n{not json}\n").unwrap();

    let err = read_run_log(&path).await.unwrap_err();
    assert!(
        matches!(err, StoreError::Decode { line: 2, .. }),
        "expected Decode at line 2, got: {err}"
    );
}
