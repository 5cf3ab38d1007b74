//! Orchestration engine for the Planner → Architect → Coder pipeline.
//!
//! ```text
//! user request
//!     |
//!     v
//! Planner ----------> Plan (files + purposes)
//!     |
//!     v
//! Architect --------> task drafts
//!     |
//!     v
//! build_task_graph -> TaskGraph (validated, totally ordered)
//!     |
//!     v
//! Pipeline controller
//!     | snapshot Workspace
//!     | TaskExecutor::execute
//!     | consistency::check
//!     | FileStore::write + Workspace::commit (graph order)
//!     v
//! PipelineOutcome
//! ```

pub mod config;
pub mod consistency;
pub mod controller;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod plan;
pub mod prompts;
pub mod retry;
pub mod state;
pub mod workspace;

pub use config::PipelineConfig;
pub use controller::{Pipeline, PipelineOutcome, run_pipeline};
pub use error::PipelineError;
pub use graph::{ImplementationTask, TaskGraph, build_task_graph};
pub use plan::{FileSpec, Plan};
pub use workspace::{Workspace, WorkspaceSnapshot};
