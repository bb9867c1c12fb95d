//! Argument validation against a tool's input schema.
//!
//! Supports the JSON Schema subset tool specs use: `type` (single or list),
//! `properties`, `required`, `additionalProperties`, `enum`, `items`,
//! `minimum`/`maximum` and `minLength`/`maxLength`. Unknown keywords are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

/// First violation found, with a `$.a.b[0]` style location.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Validate `value` against `schema`.
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    // `true`, `{}` and anything non-object accept every value.
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    check_type(schema, value, path)?;

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            let allowed: Vec<String> = options.iter().map(Value::to_string).collect();
            return Err(SchemaError::new(
                path,
                format!("must be one of [{}]", allowed.join(", ")),
            ));
        }
    }

    match value {
        Value::Object(map) => check_object(schema, map, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{path}[{i}]"))?;
                }
            }
            Ok(())
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    return Err(SchemaError::new(path, format!("shorter than {min} characters")));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    return Err(SchemaError::new(path, format!("longer than {max} characters")));
                }
            }
            Ok(())
        }
        Value::Number(n) => {
            let Some(x) = n.as_f64() else { return Ok(()) };
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if x < min {
                    return Err(SchemaError::new(path, format!("must be >= {min}")));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if x > max {
                    return Err(SchemaError::new(path, format!("must be <= {max}")));
                }
            }
            Ok(())
        }
        Value::Bool(_) | Value::Null => Ok(()),
    }
}

fn check_type(schema: &Map<String, Value>, value: &Value, path: &str) -> Result<(), SchemaError> {
    let allowed: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };
    if allowed.is_empty() || allowed.iter().any(|t| type_matches(t, value)) {
        return Ok(());
    }
    Err(SchemaError::new(
        path,
        format!("expected {}, got {}", allowed.join(" or "), type_name(value)),
    ))
}

fn check_object(
    schema: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaError> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                return Err(SchemaError::new(
                    path,
                    format!("missing required property '{name}'"),
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");

    for (key, item) in map {
        let child = format!("{path}.{key}");
        match properties.and_then(|p| p.get(key)) {
            Some(sub) => validate_at(sub, item, &child)?,
            None => match additional {
                Some(Value::Bool(false)) => {
                    return Err(SchemaError::new(path, format!("unexpected property '{key}'")));
                }
                Some(sub @ Value::Object(_)) => validate_at(sub, item, &child)?,
                _ => {}
            },
        }
    }
    Ok(())
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
