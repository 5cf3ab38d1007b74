//! Plan types and validation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wright_store::fs::validate_relative_path;

/// What to build: an ordered list of files, each with a purpose.
///
/// File order is significant: it breaks ties between independent tasks when
/// the task graph is ordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    /// Short project name.
    #[serde(default)]
    pub name: String,
    /// Files to produce.
    #[serde(default)]
    pub files: Vec<FileSpec>,
}

/// One file in the plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSpec {
    /// Relative path; unique within the plan.
    pub path: String,
    /// What the file is for.
    pub purpose: String,
    /// Paths of other planned files this file builds on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            purpose: purpose.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn depending_on(mut self, paths: &[&str]) -> Self {
        self.depends_on = paths.iter().map(|p| (*p).to_owned()).collect();
        self
    }
}

/// Errors that make a plan unusable. Raised before any task runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("plan must contain at least one file")]
    NoFiles,

    #[error("plan contains a file with an empty path")]
    EmptyPath,

    #[error("file {0:?} has no purpose")]
    EmptyPurpose(String),

    #[error("duplicate file path: {0:?}")]
    DuplicatePath(String),

    #[error("file path {0:?} must be relative and stay inside the workspace")]
    UnsafePath(String),

    #[error("file {path:?} depends on unknown file {dependency:?}")]
    UnknownFileDependency { path: String, dependency: String },

    #[error("file {0:?} depends on itself")]
    SelfDependency(String),
}

impl Plan {
    pub fn new(name: impl Into<String>, files: Vec<FileSpec>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// Check the plan invariants: at least one file, unique safe paths,
    /// non-empty purposes, and file dependencies that name other files.
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        if self.files.is_empty() {
            return Err(PlanValidationError::NoFiles);
        }

        let mut seen = HashSet::new();
        for file in &self.files {
            if file.path.trim().is_empty() {
                return Err(PlanValidationError::EmptyPath);
            }
            if validate_relative_path(&file.path).is_err() {
                return Err(PlanValidationError::UnsafePath(file.path.clone()));
            }
            if file.purpose.trim().is_empty() {
                return Err(PlanValidationError::EmptyPurpose(file.path.clone()));
            }
            if !seen.insert(file.path.as_str()) {
                return Err(PlanValidationError::DuplicatePath(file.path.clone()));
            }
        }

        for file in &self.files {
            for dep in &file.depends_on {
                if dep == &file.path {
                    return Err(PlanValidationError::SelfDependency(file.path.clone()));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(PlanValidationError::UnknownFileDependency {
                        path: file.path.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Map from path to its position in the plan.
    pub fn file_positions(&self) -> HashMap<&str, usize> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path.as_str(), i))
            .collect()
    }

    pub fn file(&self, path: &str) -> Option<&FileSpec> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_file_plan() -> Plan {
        Plan::new(
            "todo",
            vec![
                FileSpec::new("app.py", "entry point").depending_on(&["utils.py"]),
                FileSpec::new("utils.py", "helper functions"),
            ],
        )
    }

    #[test]
    fn accepts_valid_plan() {
        two_file_plan().validate().expect("plan should be valid");
    }

    #[test]
    fn rejects_empty_plan() {
        let plan = Plan::new("empty", vec![]);
        assert_eq!(plan.validate(), Err(PlanValidationError::NoFiles));
    }

    #[test]
    fn rejects_duplicate_paths() {
        let plan = Plan::new(
            "dup",
            vec![FileSpec::new("a.py", "one"), FileSpec::new("a.py", "two")],
        );
        assert_eq!(
            plan.validate(),
            Err(PlanValidationError::DuplicatePath("a.py".to_string()))
        );
    }

    #[test]
    fn rejects_blank_path_and_purpose() {
        let plan = Plan::new("blank", vec![FileSpec::new(" ", "x")]);
        assert_eq!(plan.validate(), Err(PlanValidationError::EmptyPath));

        let plan = Plan::new("blank", vec![FileSpec::new("a.py", "  ")]);
        assert!(matches!(
            plan.validate(),
            Err(PlanValidationError::EmptyPurpose(ref p)) if p == "a.py"
        ));
    }

    #[test]
    fn rejects_paths_escaping_the_workspace() {
        for bad in ["../evil.py", "/abs/path.py", ".wright/runs/x"] {
            let plan = Plan::new("bad", vec![FileSpec::new(bad, "nope")]);
            assert!(
                matches!(plan.validate(), Err(PlanValidationError::UnsafePath(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_aliases_of_another_path() {
        for alias in ["src/./a.py", "src//a.py"] {
            let plan = Plan::new(
                "aliases",
                vec![FileSpec::new("src/a.py", "real"), FileSpec::new(alias, "alias")],
            );
            assert_eq!(
                plan.validate(),
                Err(PlanValidationError::UnsafePath(alias.to_string()))
            );
        }
    }

    #[test]
    fn rejects_unknown_and_self_dependencies() {
        let plan = Plan::new(
            "deps",
            vec![FileSpec::new("a.py", "a").depending_on(&["missing.py"])],
        );
        assert!(matches!(
            plan.validate(),
            Err(PlanValidationError::UnknownFileDependency { .. })
        ));

        let plan = Plan::new("deps", vec![FileSpec::new("a.py", "a").depending_on(&["a.py"])]);
        assert_eq!(
            plan.validate(),
            Err(PlanValidationError::SelfDependency("a.py".to_string()))
        );
    }

    #[test]
    fn file_positions_follow_declaration_order() {
        let plan = two_file_plan();
        let positions = plan.file_positions();
        assert_eq!(positions["app.py"], 0);
        assert_eq!(positions["utils.py"], 1);
        assert_eq!(plan.paths(), vec!["app.py", "utils.py"]);
    }

    #[test]
    fn deserializes_model_json_without_optional_fields() {
        let plan: Plan = serde_json::from_value(serde_json::json!({
            "files": [{"path": "index.html", "purpose": "markup"}]
        }))
        .unwrap();
        assert_eq!(plan.name, "");
        assert!(plan.files[0].depends_on.is_empty());
    }
}
