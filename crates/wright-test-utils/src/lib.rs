//! Shared test doubles for wright integration tests.
//!
//! - [`ScriptedModel`]: a [`ModelService`](wright_core::model::ModelService)
//!   that replays queued replies per schema.
//! - [`ScriptedExecutor`]: a [`TaskExecutor`](wright_core::executor::TaskExecutor)
//!   driven by per-task steps, logging every invocation.
//! - [`FlakyStore`]: a [`FileStore`](wright_store::FileStore) with injected
//!   write failures.
//! - [`fixtures`]: small plans and graphs.

mod executor;
pub mod fixtures;
mod model;
mod store;

pub use executor::{Invocation, ScriptedExecutor, Step, generated_content};
pub use model::ScriptedModel;
pub use store::FlakyStore;
