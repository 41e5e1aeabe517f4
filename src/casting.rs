//! Cast stage: coerce a structural value toward the shape its schema declares.
//!
//! Only strings are converted (to `integer`, `number` or `boolean`); arrays
//! and objects are walked through `items` and `properties`. Anything the
//! cast can't improve is passed through for the validator to judge.

use serde_json::{Map, Number, Value};

use crate::error::ValidationError;

/// Cast `value` toward `schema`.
///
/// # Errors
///
/// Returns `ValidationError::Cast` if a string can't be read as the
/// primitive type the schema requires.
pub fn cast(schema: &Value, value: Value) -> Result<Value, ValidationError> {
    match (primary_type(schema), value) {
        (Some("integer"), Value::String(s)) => integer_value(s.trim())
            .ok_or_else(|| cast_error("integer", &s)),
        (Some("number"), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(number_value)
            .ok_or_else(|| cast_error("number", &s)),
        (Some("boolean"), Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(cast_error("boolean", &s)),
        },
        (Some("array"), Value::Array(items)) => cast_items(schema, items),
        (Some("object") | None, Value::Object(map)) => cast_properties(schema, map),
        (_, other) => Ok(other),
    }
}

/// The first non-null type a schema names.
///
/// Handles both `"type": "integer"` and `"type": ["integer", "null"]`.
pub fn primary_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn cast_items(schema: &Value, items: Vec<Value>) -> Result<Value, ValidationError> {
    let Some(item_schema) = schema.get("items") else {
        return Ok(Value::Array(items));
    };
    items
        .into_iter()
        .map(|item| cast(item_schema, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn cast_properties(schema: &Value, map: Map<String, Value>) -> Result<Value, ValidationError> {
    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema
        .get("additionalProperties")
        .filter(|value| value.is_object());

    if properties.is_none() && additional.is_none() {
        return Ok(Value::Object(map));
    }

    let mut result = Map::new();
    for (key, value) in map {
        let property_schema = properties.and_then(|props| props.get(&key)).or(additional);
        let casted = match property_schema {
            Some(property_schema) => cast(property_schema, value)?,
            None => value,
        };
        result.insert(key, casted);
    }
    Ok(Value::Object(result))
}

/// Negative values fit `i64`; anything above `i64::MAX` is tried as `u64`.
fn integer_value(s: &str) -> Option<Value> {
    s.parse::<i64>()
        .map(Number::from)
        .or_else(|_| s.parse::<u64>().map(Number::from))
        .ok()
        .map(Value::Number)
}

fn number_value(n: f64) -> Option<Value> {
    Number::from_f64(n).map(Value::Number)
}

fn cast_error(expected: &str, value: &str) -> ValidationError {
    ValidationError::Cast {
        expected: expected.to_string(),
        value: format!("{:?}", value),
    }
}
