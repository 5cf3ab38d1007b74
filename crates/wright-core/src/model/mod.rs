//! Model invocation service: a single fallible call that takes a prompt and
//! an output schema and returns a schema-conforming JSON value.
//!
//! ```text
//! Planner / Architect / ModelExecutor
//!     |
//!     v
//! ModelRegistry --get("claude-code")--> Arc<dyn ModelService>
//!     |                                        |
//!     |   invoke(ModelRequest) ----------------+
//!     |        |
//!     |        v
//!     |   Ok(serde_json::Value) | Err(ModelError)
//! ```

pub mod command;
pub mod registry;
pub mod schema;
pub mod structured;
pub mod trait_def;

pub use command::{CommandModel, CommandModelConfig};
pub use registry::ModelRegistry;
pub use structured::{Rejection, StructuredError, invoke_structured};
pub use trait_def::{ModelError, ModelRequest, ModelService};
