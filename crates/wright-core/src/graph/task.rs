//! Implementation task types produced by the architect stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Task identifier, unique within a graph.
pub type TaskId = String;

/// What kind of symbol a task declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Variable,
    Constant,
    Type,
    Module,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Type => "type",
            Self::Module => "module",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an invalid symbol kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolKindParseError(pub String);

impl fmt::Display for SymbolKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid symbol kind: {:?}", self.0)
    }
}

impl std::error::Error for SymbolKindParseError {}

impl FromStr for SymbolKind {
    type Err = SymbolKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "class" => Ok(Self::Class),
            "variable" => Ok(Self::Variable),
            "constant" => Ok(Self::Constant),
            "type" => Ok(Self::Type),
            "module" => Ok(Self::Module),
            other => Err(SymbolKindParseError(other.to_string())),
        }
    }
}

/// A symbol a task must define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    pub kind: SymbolKind,
    /// Intended signature, e.g. `foo(x: int) -> int`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SymbolSpec {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

impl fmt::Display for SymbolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signature {
            Some(sig) => write!(f, "{} `{}`", self.kind, sig),
            None => write!(f, "{} `{}`", self.kind, self.name),
        }
    }
}

/// A symbol used from a dependency task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Id of the task that declares the symbol.
    pub task: TaskId,
    pub name: String,
}

/// One unit of implementation work targeting a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationTask {
    pub id: TaskId,
    /// Target file; must be a path in the plan.
    pub path: String,
    /// What to implement.
    pub description: String,
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    #[serde(default)]
    pub uses: Vec<SymbolRef>,
    /// Tasks that must be committed first.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Self-contained description of the imports the file needs.
    #[serde(default)]
    pub imports: Vec<String>,
}

impl ImplementationTask {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            description: description.into(),
            symbols: Vec::new(),
            uses: Vec::new(),
            depends_on: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: SymbolSpec) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn using(mut self, task: &str, name: &str) -> Self {
        self.uses.push(SymbolRef {
            task: task.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn depending_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|id| (*id).to_owned()).collect();
        self
    }

    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        self.imports.push(import.into());
        self
    }

    /// Look up a declared symbol by name.
    pub fn symbol(&self, name: &str) -> Option<&SymbolSpec> {
        self.symbols.iter().find(|s| s.name == name)
    }
}
