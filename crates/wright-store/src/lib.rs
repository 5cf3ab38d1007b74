//! Persistence layer for wright: the file-system collaborator that mirrors
//! committed workspace entries to disk, and the JSONL run log.

pub mod config;
pub mod fs;
pub mod models;
pub mod runlog;

pub use config::StoreConfig;
pub use fs::{DiskStore, FileStore, MemoryStore, StoreError};
pub use models::{RunEvent, RunRecord, RunStatus, TaskState, content_digest};
pub use runlog::{RunLogWriter, read_run_log};
