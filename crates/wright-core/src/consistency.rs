//! Cross-file consistency check run on every successful result before it
//! is committed.
//!
//! The check is lexical and language-agnostic. It looks at identifier
//! tokens and whitespace-normalized signatures, not at a parsed syntax
//! tree:
//!
//! 1. every symbol the task declares appears; declared signatures appear
//!    verbatim modulo whitespace;
//! 2. symbols declared by earlier tasks on the same path survive with
//!    their signatures;
//! 3. every symbol the task uses from a dependency appears, and calls to
//!    it pass an argument count the dependency's signature accepts;
//! 4. symbols declared by dependencies on other paths are not re-declared.
//!
//! Arity is the only part of a use-site signature that is checked. Argument
//! types are not. Signatures with variadic parameters (`*args`, `...`)
//! accept any count at or above their required parameters.

use std::collections::HashSet;
use std::fmt;

use crate::graph::{ImplementationTask, TaskGraph};

/// Keywords that introduce a definition in common languages.
const DEFINITION_KEYWORDS: &[&str] = &[
    "def", "class", "function", "fn", "const", "let", "var", "struct", "enum", "interface",
    "type", "trait", "static",
];

/// One violated consistency rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    MissingSymbol {
        name: String,
    },
    SignatureMismatch {
        name: String,
        signature: String,
    },
    EarlierSymbolLost {
        task: String,
        name: String,
    },
    EarlierSignatureChanged {
        task: String,
        signature: String,
    },
    MissingUse {
        task: String,
        name: String,
    },
    UseArityMismatch {
        task: String,
        signature: String,
        passed: usize,
        line: usize,
    },
    Redeclared {
        task: String,
        name: String,
        line: usize,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSymbol { name } => {
                write!(f, "declared symbol `{name}` is missing from the output")
            }
            Self::SignatureMismatch { name, signature } => write!(
                f,
                "symbol `{name}` does not have the required signature `{signature}`"
            ),
            Self::EarlierSymbolLost { task, name } => write!(
                f,
                "symbol `{name}` written by earlier task {task:?} was removed or renamed"
            ),
            Self::EarlierSignatureChanged { task, signature } => write!(
                f,
                "signature `{signature}` written by earlier task {task:?} was changed"
            ),
            Self::MissingUse { task, name } => write!(
                f,
                "symbol `{name}` from dependency {task:?} is never referenced"
            ),
            Self::UseArityMismatch {
                task,
                signature,
                passed,
                line,
            } => write!(
                f,
                "line {line} passes {passed} argument(s), but dependency {task:?} declares `{signature}`"
            ),
            Self::Redeclared { task, name, line } => write!(
                f,
                "line {line} re-declares `{name}`, which dependency {task:?} defines; import it instead"
            ),
        }
    }
}

/// Check `content` for the task at `position` in `graph`.
pub fn check_in_graph(graph: &TaskGraph, position: usize, content: &str) -> Vec<Inconsistency> {
    let task = &graph.tasks()[position];
    check(
        task,
        &graph.dependencies_of(position),
        &graph.earlier_on_path(position),
        content,
    )
}

/// Check `content`, the full proposed file, against the task contract.
pub fn check(
    task: &ImplementationTask,
    dependencies: &[&ImplementationTask],
    earlier_on_path: &[&ImplementationTask],
    content: &str,
) -> Vec<Inconsistency> {
    let identifiers = identifiers(content);
    let normalized = strip_whitespace(content);
    let mut found = Vec::new();

    for symbol in &task.symbols {
        if !contains_name(&identifiers, &symbol.name) {
            found.push(Inconsistency::MissingSymbol {
                name: symbol.name.clone(),
            });
        } else if let Some(sig) = &symbol.signature {
            if !normalized.contains(&strip_whitespace(sig)) {
                found.push(Inconsistency::SignatureMismatch {
                    name: symbol.name.clone(),
                    signature: sig.clone(),
                });
            }
        }
    }

    for earlier in earlier_on_path {
        for symbol in &earlier.symbols {
            if !contains_name(&identifiers, &symbol.name) {
                found.push(Inconsistency::EarlierSymbolLost {
                    task: earlier.id.clone(),
                    name: symbol.name.clone(),
                });
            } else if let Some(sig) = &symbol.signature {
                if !normalized.contains(&strip_whitespace(sig)) {
                    found.push(Inconsistency::EarlierSignatureChanged {
                        task: earlier.id.clone(),
                        signature: sig.clone(),
                    });
                }
            }
        }
    }

    for used in &task.uses {
        if !contains_name(&identifiers, &used.name) {
            found.push(Inconsistency::MissingUse {
                task: used.task.clone(),
                name: used.name.clone(),
            });
            continue;
        }
        let Some(signature) = dependencies
            .iter()
            .find(|d| d.id == used.task)
            .and_then(|d| d.symbol(&used.name))
            .and_then(|s| s.signature.as_deref())
        else {
            continue;
        };
        let Some(arity) = Arity::of_signature(signature) else {
            continue;
        };
        if let Some((line, passed)) = first_bad_call(content, &used.name, arity) {
            found.push(Inconsistency::UseArityMismatch {
                task: used.task.clone(),
                signature: signature.to_string(),
                passed,
                line,
            });
        }
    }

    let own: HashSet<&str> = task.symbols.iter().map(|s| s.name.as_str()).collect();
    for dep in dependencies.iter().filter(|d| d.path != task.path) {
        for symbol in &dep.symbols {
            if own.contains(symbol.name.as_str()) {
                continue;
            }
            if let Some(line) = redeclaration_line(content, &symbol.name) {
                found.push(Inconsistency::Redeclared {
                    task: dep.id.clone(),
                    name: symbol.name.clone(),
                    line,
                });
            }
        }
    }

    found
}

/// Accepted argument counts of a declared signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arity {
    required: usize,
    /// `None` when the signature takes variadic arguments.
    max: Option<usize>,
}

impl Arity {
    /// Parse the first parenthesized parameter list. Receivers (`self`,
    /// `cls`, `this`) are not counted.
    fn of_signature(signature: &str) -> Option<Self> {
        let open = signature.find('(')?;
        let inner = balanced_inner(&signature[open..])?;
        let mut arity = Self {
            required: 0,
            max: Some(0),
        };
        for param in split_top_level(inner, true) {
            let bare = param.trim_start_matches(['&', ' ']).trim_start_matches("mut ");
            if matches!(bare, "self" | "cls" | "this") || bare.starts_with("self:") {
                continue;
            }
            if param.starts_with('*') || param.starts_with("...") || param.ends_with("...") {
                arity.max = None;
                continue;
            }
            if param == "/" {
                continue;
            }
            arity.max = arity.max.map(|m| m + 1);
            if !param.contains('=') && !param.ends_with('?') && !param.contains("?:") {
                arity.required += 1;
            }
        }
        Some(arity)
    }

    fn accepts(self, passed: usize) -> bool {
        passed >= self.required && self.max.is_none_or(|m| passed <= m)
    }
}

/// Content between the opening bracket at the start of `text` and its
/// matching close, or `None` if it never closes.
fn balanced_inner(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-empty, trimmed comma-separated items at bracket depth zero. Angle
/// brackets nest only when `generics` is set, so comparisons in call
/// arguments do not.
fn split_top_level(text: &str, generics: bool) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            '<' if generics => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if generics => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(text[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}

/// First call of `name` whose argument count `arity` rejects, as
/// `(one-based line, arguments passed)`. Definition and import lines are
/// skipped.
fn first_bad_call(content: &str, name: &str, arity: Arity) -> Option<(usize, usize)> {
    let callee = tokens(name).last()?;
    let mut line_starts = content.match_indices('\n').map(|(i, _)| i + 1);
    let mut line = 1;
    let mut next_line_start = line_starts.next();

    let mut search = 0;
    while let Some(offset) = content[search..].find(callee) {
        let at = search + offset;
        let end = at + callee.len();
        search = end;

        while next_line_start.is_some_and(|s| s <= at) {
            line += 1;
            next_line_start = line_starts.next();
        }

        let before_ok = content[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !is_identifier_char(c));
        let rest = &content[end..];
        let after = rest.trim_start_matches([' ', '\t']);
        if !before_ok || !after.starts_with('(') {
            continue;
        }

        let line_text = content.lines().nth(line - 1).unwrap_or_default();
        let line_tokens: Vec<&str> = tokens(line_text).collect();
        if is_import_line(&line_tokens)
            || line_tokens
                .windows(2)
                .any(|w| DEFINITION_KEYWORDS.contains(&w[0]) && w[1] == callee)
        {
            continue;
        }

        let Some(args) = balanced_inner(after) else {
            continue;
        };
        let passed = split_top_level(args, false).len();
        if !arity.accepts(passed) {
            return Some((line, passed));
        }
    }
    None
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_identifier_char(c))
        .filter(|t| !t.is_empty())
}

fn identifiers(text: &str) -> HashSet<&str> {
    tokens(text).collect()
}

/// Dotted names (`models.User`) match when every segment is present.
fn contains_name(identifiers: &HashSet<&str>, name: &str) -> bool {
    let mut segments = tokens(name).peekable();
    segments.peek().is_some() && segments.all(|s| identifiers.contains(s))
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_import_line(line_tokens: &[&str]) -> bool {
    line_tokens.iter().any(|t| matches!(*t, "import" | "require"))
        || matches!(
            line_tokens.first().copied(),
            Some("from" | "use" | "include" | "using")
        )
}

/// One-based line number of the first definition of `name`, if any.
fn redeclaration_line(content: &str, name: &str) -> Option<usize> {
    let last_segment = tokens(name).last()?;
    content.lines().enumerate().find_map(|(i, line)| {
        let line_tokens: Vec<&str> = tokens(line).collect();
        if is_import_line(&line_tokens) {
            return None;
        }
        line_tokens
            .windows(2)
            .any(|w| DEFINITION_KEYWORDS.contains(&w[0]) && w[1] == last_segment)
            .then_some(i + 1)
    })
}
