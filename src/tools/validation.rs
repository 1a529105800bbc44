//! Validate tool call arguments against a tool's JSON Schema before execution.

use serde_json::Value;

use crate::error::ParleyError;

/// Validate `args` for the tool named `tool_name` against `schema`.
///
/// Checks the top-level type, required field presence, per-property types,
/// `enum` membership and the element type of string arrays. Nested objects
/// are only type-checked, not descended into.
pub fn validate_arguments(tool_name: &str, args: &Value, schema: &Value) -> Result<(), ParleyError> {
    check(args, schema).map_err(|message| {
        ParleyError::InvalidArgument(format!("{tool_name}: {message}"))
    })
}

fn check(args: &Value, schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!("expected object arguments, got {}", json_type_name(args)));
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        if let Some(name) = required
            .iter()
            .filter_map(Value::as_str)
            .find(|name| !obj.contains_key(*name))
        {
            return Err(format!("missing required field '{name}'"));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(prop_schema) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = prop_schema.get("type").and_then(Value::as_str) {
            if !value_matches_type(value, expected) {
                return Err(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    json_type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!("field '{key}' must be one of {}", Value::Array(allowed.clone())));
            }
        }
        if let (Some(items), Some(item_type)) = (
            value.as_array(),
            prop_schema
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str),
        ) {
            if let Some(pos) = items.iter().position(|item| !value_matches_type(item, item_type)) {
                return Err(format!("field '{key}[{pos}]' expected type '{item_type}'"));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
