//! Task graph: the architect stage, task types, and the builder that
//! validates and orders them.

pub mod architect;
pub mod builder;
pub mod task;

pub use architect::{Architect, FileArchitect, ModelArchitect};
pub use builder::{GraphValidationError, TaskGraph, build_task_graph};
pub use task::{ImplementationTask, SymbolKind, SymbolRef, SymbolSpec, TaskId};
