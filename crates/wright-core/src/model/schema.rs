//! Output schemas for the three model stages and a structural conformance
//! check.
//!
//! The check is intentionally shallow: it verifies JSON types and required
//! keys, recursing through `properties` and array `items`. Value ranges and
//! formats are left to the typed deserialization that follows.

use serde_json::{Value, json};

pub const PLAN_SCHEMA: &str = "plan";
pub const TASK_GRAPH_SCHEMA: &str = "task_graph";
pub const FILE_CONTENT_SCHEMA: &str = "file_content";

/// `{ name?, files: [{ path, purpose, depends_on? }] }`
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "required": ["files"],
        "properties": {
            "name": { "type": "string" },
            "files": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "purpose"],
                    "properties": {
                        "path": { "type": "string" },
                        "purpose": { "type": "string" },
                        "depends_on": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

/// `{ tasks: [{ id, path, description, symbols?, uses?, depends_on?, imports? }] }`
pub fn task_graph_schema() -> Value {
    json!({
        "type": "object",
        "required": ["tasks"],
        "properties": {
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "path", "description"],
                    "properties": {
                        "id": { "type": "string" },
                        "path": { "type": "string" },
                        "description": { "type": "string" },
                        "symbols": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "kind"],
                                "properties": {
                                    "name": { "type": "string" },
                                    "kind": { "type": "string" },
                                    "signature": { "type": "string" }
                                }
                            }
                        },
                        "uses": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["task", "name"],
                                "properties": {
                                    "task": { "type": "string" },
                                    "name": { "type": "string" }
                                }
                            }
                        },
                        "depends_on": { "type": "array", "items": { "type": "string" } },
                        "imports": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

/// `{ path, content }`: the complete text of the target file after the
/// task.
pub fn file_content_schema() -> Value {
    json!({
        "type": "object",
        "required": ["path", "content"],
        "properties": {
            "path": { "type": "string" },
            "content": { "type": "string" }
        }
    })
}

/// Return a description of the first place where `value` does not conform
/// to `schema`, or `None` if it conforms.
pub fn first_violation(schema: &Value, value: &Value) -> Option<String> {
    check_at(schema, value, "$")
}

fn check_at(schema: &Value, value: &Value, at: &str) -> Option<String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !has_type(value, expected) {
            return Some(format!("{at}: expected {expected}, found {}", type_name(value)));
        }
    }

    if let (Some(required), Some(object)) = (
        schema.get("required").and_then(Value::as_array),
        value.as_object(),
    ) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Some(format!("{at}: missing required field {key:?}"));
            }
        }
    }

    if let (Some(properties), Some(object)) = (
        schema.get("properties").and_then(Value::as_object),
        value.as_object(),
    ) {
        for (key, sub_schema) in properties {
            if let Some(sub_value) = object.get(key) {
                if let Some(problem) = check_at(sub_schema, sub_value, &format!("{at}.{key}")) {
                    return Some(problem);
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            if let Some(problem) = check_at(items, item, &format!("{at}[{i}]")) {
                return Some(problem);
            }
        }
    }

    None
}

fn has_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conforming_plan_passes() {
        let value = json!({
            "name": "todo",
            "files": [{"path": "app.py", "purpose": "entry", "depends_on": []}]
        });
        assert_eq!(first_violation(&plan_schema(), &value), None);
    }

    #[test]
    fn missing_top_level_field_is_reported() {
        let problem = first_violation(&plan_schema(), &json!({"name": "x"})).unwrap();
        assert!(problem.contains("\"files\""), "got: {problem}");
    }

    #[test]
    fn nested_type_mismatch_reports_location() {
        let value = json!({"files": [{"path": "a.py", "purpose": 7}]});
        let problem = first_violation(&plan_schema(), &value).unwrap();
        assert_eq!(problem, "$.files[0].purpose: expected string, found number");
    }

    #[test]
    fn task_graph_symbols_require_name_and_kind() {
        let value = json!({"tasks": [{
            "id": "t1", "path": "a.py", "description": "d",
            "symbols": [{"name": "f"}]
        }]});
        let problem = first_violation(&task_graph_schema(), &value).unwrap();
        assert!(problem.contains("symbols[0]"), "got: {problem}");
    }

    #[test]
    fn file_content_must_be_object() {
        let problem = first_violation(&file_content_schema(), &json!("print(1)")).unwrap();
        assert!(problem.contains("expected object"));
    }
}
