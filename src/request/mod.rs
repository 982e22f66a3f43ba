//! Request tree vocabulary: methods, reserved keys, and typed field access.
//!
//! A request is a `serde_json::Map` with insertion order preserved. Keys are
//! classified by naming convention only (see [`keys`]).

pub mod keys;
pub mod method;

pub use method::{QueryMode, RequestMethod, UnknownMethod};

use serde_json::{Map, Value};
use thiserror::Error;

/// Ordered JSON object used for request nodes and result rows.
pub type JsonMap = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{key}:value has the wrong type, expected {expected}")]
pub struct FieldTypeError {
    pub key: String,
    pub expected: &'static str,
}

impl FieldTypeError {
    fn new(key: &str, expected: &'static str) -> Self {
        Self {
            key: key.to_string(),
            expected,
        }
    }
}

/// String field; numbers and booleans are rendered as their literal text.
pub fn get_string(node: &JsonMap, key: &str) -> Result<Option<String>, FieldTypeError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(FieldTypeError::new(key, "string")),
    }
}

pub fn get_bool(node: &JsonMap, key: &str) -> Result<Option<bool>, FieldTypeError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(FieldTypeError::new(key, "boolean")),
        },
        Some(_) => Err(FieldTypeError::new(key, "boolean")),
    }
}

pub fn get_int(node: &JsonMap, key: &str) -> Result<Option<i64>, FieldTypeError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| FieldTypeError::new(key, "integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| FieldTypeError::new(key, "integer")),
        Some(_) => Err(FieldTypeError::new(key, "integer")),
    }
}

/// Walks `keys` through nested objects (and arrays, by numeric segment).
pub fn value_at<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in keys {
        current = match current {
            Value::Object(map) => map.get(*key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Same as [`value_at`] starting from an object.
pub fn map_value_at<'a>(root: &'a JsonMap, keys: &[&str]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    value_at(root.get(*first)?, rest)
}

/// Scalar JSON values; only these are extracted by `Table-key[]` arrays.
pub fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
