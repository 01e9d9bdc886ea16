//! Structural JSON Schema checks for tool contracts.
//!
//! The registry validates three things: that a descriptor's schemas are
//! well-formed at registration time, that call arguments satisfy the input
//! schema, and that handler results satisfy the output schema. The subset
//! understood here is the one the integrated systems actually declare:
//! `type`, `properties`, `required`, `items`, and `enum`.

use serde_json::Value;

const KNOWN_TYPES: &[&str] = &[
    "object", "array", "string", "number", "integer", "boolean", "null",
];

/// Check that a schema is well-formed. Returns violations, empty when valid.
pub fn check_schema(schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check_schema_at(schema, "$", &mut violations);
    violations
}

fn check_schema_at(schema: &Value, path: &str, out: &mut Vec<String>) {
    let obj = match schema.as_object() {
        Some(obj) => obj,
        None => {
            out.push(format!("{}: schema must be a JSON object", path));
            return;
        }
    };

    match obj.get("type").and_then(|t| t.as_str()) {
        Some(t) if KNOWN_TYPES.contains(&t) => {}
        Some(t) => out.push(format!("{}: unknown type '{}'", path, t)),
        None => out.push(format!("{}: missing 'type'", path)),
    }

    if let Some(props) = obj.get("properties") {
        match props.as_object() {
            Some(props) => {
                for (name, sub) in props {
                    check_schema_at(sub, &format!("{}.{}", path, name), out);
                }
            }
            None => out.push(format!("{}: 'properties' must be an object", path)),
        }
    }

    if let Some(required) = obj.get("required") {
        match required.as_array() {
            Some(entries) => {
                let props = obj.get("properties").and_then(|p| p.as_object());
                for entry in entries {
                    match entry.as_str() {
                        Some(name) => {
                            if !props.is_some_and(|p| p.contains_key(name)) {
                                out.push(format!(
                                    "{}: required field '{}' not declared in properties",
                                    path, name
                                ));
                            }
                        }
                        None => out.push(format!("{}: 'required' entries must be strings", path)),
                    }
                }
            }
            None => out.push(format!("{}: 'required' must be an array", path)),
        }
    }

    if let Some(items) = obj.get("items") {
        check_schema_at(items, &format!("{}[]", path), out);
    }
}

/// Check a value against a schema. Returns violations, empty when valid.
pub fn check_value(schema: &Value, value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check_value_at(schema, value, "$", &mut violations);
    violations
}

fn check_value_at(schema: &Value, value: &Value, path: &str, out: &mut Vec<String>) {
    let obj = match schema.as_object() {
        Some(obj) => obj,
        None => return,
    };

    if let Some(expected) = obj.get("type").and_then(|t| t.as_str()) {
        if !type_matches(expected, value) {
            out.push(format!(
                "{}: expected {}, got {}",
                path,
                expected,
                type_name(value)
            ));
            return;
        }
    }

    if let Some(allowed) = obj.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            out.push(format!("{}: value not in enum", path));
        }
    }

    if let Some(map) = value.as_object() {
        if let Some(required) = obj.get("required").and_then(|r| r.as_array()) {
            for entry in required.iter().filter_map(|r| r.as_str()) {
                if !map.contains_key(entry) {
                    out.push(format!("{}: missing required field '{}'", path, entry));
                }
            }
        }
        if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
            for (name, sub_schema) in props {
                if let Some(sub_value) = map.get(name) {
                    check_value_at(sub_schema, sub_value, &format!("{}.{}", path, name), out);
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (obj.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            check_value_at(items, item, &format!("{}[{}]", path, i), out);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
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

/// The set of required top-level input properties, used for the
/// re-registration arity compatibility check.
pub fn required_fields(schema: &Value) -> Vec<String> {
    let mut fields: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    fields.sort();
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        });
        assert!(check_schema(&schema).is_empty());
    }

    #[test]
    fn test_schema_missing_type() {
        let schema = json!({"properties": {}});
        let violations = check_schema(&schema);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("missing 'type'"));
    }

    #[test]
    fn test_schema_unknown_type() {
        let schema = json!({"type": "tuple"});
        assert!(check_schema(&schema)[0].contains("unknown type"));
    }

    #[test]
    fn test_schema_required_not_declared() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a", "b"]
        });
        let violations = check_schema(&schema);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("'b'"));
    }

    #[test]
    fn test_value_ok() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        });
        let value = json!({"query": "fusion reactors", "limit": 5});
        assert!(check_value(&schema, &value).is_empty());
    }

    #[test]
    fn test_value_missing_required() {
        let schema = json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        });
        let violations = check_value(&schema, &json!({}));
        assert!(violations[0].contains("missing required field 'query'"));
    }

    #[test]
    fn test_value_wrong_type() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {"type": "integer"}}
        });
        let violations = check_value(&schema, &json!({"limit": "ten"}));
        assert!(violations[0].contains("expected integer"));
    }

    #[test]
    fn test_integer_accepted_as_number() {
        let schema = json!({"type": "number"});
        assert!(check_value(&schema, &json!(3)).is_empty());
        assert!(check_value(&schema, &json!(3.5)).is_empty());
    }

    #[test]
    fn test_array_items() {
        let schema = json!({
            "type": "array",
            "items": {"type": "string"}
        });
        assert!(check_value(&schema, &json!(["a", "b"])).is_empty());
        let violations = check_value(&schema, &json!(["a", 1]));
        assert!(violations[0].contains("$[1]"));
    }

    #[test]
    fn test_required_fields_sorted() {
        let schema = json!({"type": "object", "required": ["b", "a"]});
        assert_eq!(required_fields(&schema), vec!["a", "b"]);
        assert!(required_fields(&json!({"type": "object"})).is_empty());
    }
}
