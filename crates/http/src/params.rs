//! Request parameter encoding.
//!
//! Nested objects are flattened into bracketed keys (`sendBackData[key]`),
//! the form PHP decodes back into nested arrays. Arrays of scalars use
//! `key[]`; arrays of objects use `key[0][field]`. `null` encodes as an
//! empty value.

use serde::Serialize;
use serde_json::Value;

use crate::error::HttpError;

/// Flattens `body` into ordered key/value pairs.
pub fn encode_params<T: Serialize>(body: &T) -> Result<Vec<(String, String)>, HttpError> {
    match serde_json::to_value(body)? {
        Value::Object(map) => {
            let mut out = Vec::new();
            for (key, value) in &map {
                flatten(key, value, &mut out);
            }
            Ok(out)
        }
        other => Err(HttpError::InvalidParams(kind(&other))),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten(&format!("{prefix}[{key}]"), inner, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if item.is_object() || item.is_array() {
                    flatten(&format!("{prefix}[{i}]"), item, out);
                } else {
                    flatten(&format!("{prefix}[]"), item, out);
                }
            }
        }
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
