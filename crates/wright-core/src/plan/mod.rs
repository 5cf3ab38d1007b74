//! Plan model: the files to produce, TOML on-disk format, and the planner
//! stage that derives a plan from a user request.

pub mod generate;
pub mod model;
pub mod parser;

pub use generate::{ModelPlanner, Planner, StaticPlanner};
pub use model::{FileSpec, Plan, PlanValidationError};
pub use parser::{PlanParseError, parse_plan_toml};
