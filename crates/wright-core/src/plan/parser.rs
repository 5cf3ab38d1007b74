//! Plan TOML parser with validation.
//!
//! The on-disk format is:
//!
//! ```toml
//! name = "todo-app"
//!
//! [[files]]
//! path = "utils.py"
//! purpose = "helper functions"
//!
//! [[files]]
//! path = "app.py"
//! purpose = "entry point"
//! depends_on = ["utils.py"]
//! ```

use thiserror::Error;

use super::model::{Plan, PlanValidationError};

/// Errors that can occur while reading a plan file.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] PlanValidationError),
}

/// Parse and validate a plan TOML string.
pub fn parse_plan_toml(content: &str) -> Result<Plan, PlanParseError> {
    let plan: Plan = toml::from_str(content)?;
    plan.validate()?;
    Ok(plan)
}

impl Plan {
    /// Serialize the plan in the on-disk TOML format.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}
