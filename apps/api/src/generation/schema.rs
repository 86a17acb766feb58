//! Closed-world structural validation of untrusted model output.
//!
//! Small combinators over `serde_json::Value`. Every object position declares
//! an allow-list of keys; anything else is rejected. The first violated rule
//! aborts with the exact field path (e.g. `issues[2].severity invalid`), and
//! nothing is ever partially accepted.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SchemaError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.path.is_empty() { "payload" } else { self.path.as_str() };
        write!(f, "{at} {}", self.reason)
    }
}

impl SchemaError {
    pub fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Allowed length of an array position.
#[derive(Debug, Clone, Copy)]
pub enum Cardinality {
    Exactly(usize),
    AtMost(usize),
}

/// Path of `key` under the object at `path`.
pub fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Path of element `index` of the array at `path`.
pub fn item(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// Asserts `value` is an object whose keys are all in `allowed`.
pub fn object<'a>(
    value: &'a Value,
    path: &str,
    allowed: &[&str],
) -> Result<&'a Map<String, Value>, SchemaError> {
    let map = value
        .as_object()
        .ok_or_else(|| SchemaError::new(path, "must be an object"))?;
    closed(map, path, allowed)?;
    Ok(map)
}

/// Rejects any key of `map` that is not in `allowed`.
pub fn closed(map: &Map<String, Value>, path: &str, allowed: &[&str]) -> Result<(), SchemaError> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(SchemaError::new(path, format!("has unexpected key \"{unknown}\""))),
        None => Ok(()),
    }
}

/// Required member `key` of `map`.
pub fn field<'a>(map: &'a Map<String, Value>, path: &str, key: &str) -> Result<&'a Value, SchemaError> {
    map.get(key)
        .ok_or_else(|| SchemaError::new(&child(path, key), "missing"))
}

/// Integer within the inclusive range `[min, max]`.
///
/// A float with no fractional part (`5.0`) counts as an integer.
pub fn integer(value: &Value, path: &str, min: i64, max: i64) -> Result<i64, SchemaError> {
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        _ => None,
    }
    .ok_or_else(|| SchemaError::new(path, "must be an integer"))?;

    if n < min || n > max {
        return Err(SchemaError::new(path, format!("out of range [{min}, {max}]")));
    }
    Ok(n)
}

/// `null` or an integer within `[min, max]`.
pub fn nullable_integer(value: &Value, path: &str, min: i64, max: i64) -> Result<Option<i64>, SchemaError> {
    if value.is_null() {
        return Ok(None);
    }
    integer(value, path, min, max).map(Some)
}

pub fn boolean(value: &Value, path: &str) -> Result<bool, SchemaError> {
    value
        .as_bool()
        .ok_or_else(|| SchemaError::new(path, "must be a boolean"))
}

/// Non-blank string of at most `max_chars` characters.
pub fn text(value: &Value, path: &str, max_chars: usize) -> Result<String, SchemaError> {
    let s = value
        .as_str()
        .ok_or_else(|| SchemaError::new(path, "must be a string"))?;
    if s.trim().is_empty() {
        return Err(SchemaError::new(path, "must not be empty"));
    }
    if s.chars().count() > max_chars {
        return Err(SchemaError::new(path, format!("exceeds {max_chars} characters")));
    }
    Ok(s.to_string())
}

/// `null` or a non-blank string.
pub fn nullable_text(value: &Value, path: &str, max_chars: usize) -> Result<Option<String>, SchemaError> {
    if value.is_null() {
        return Ok(None);
    }
    text(value, path, max_chars).map(Some)
}

/// String drawn from a fixed vocabulary.
pub fn one_of<'v>(value: &Value, path: &str, allowed: &[&'v str]) -> Result<&'v str, SchemaError> {
    value
        .as_str()
        .and_then(|s| allowed.iter().find(|a| **a == s).copied())
        .ok_or_else(|| SchemaError::new(path, "invalid"))
}

/// Array whose length satisfies `cardinality`.
pub fn array<'a>(value: &'a Value, path: &str, cardinality: Cardinality) -> Result<&'a [Value], SchemaError> {
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::new(path, "must be an array"))?;
    match cardinality {
        Cardinality::Exactly(n) if items.len() != n => Err(SchemaError::new(
            path,
            format!("must have exactly {n} items (got {})", items.len()),
        )),
        Cardinality::AtMost(n) if items.len() > n => Err(SchemaError::new(
            path,
            format!("exceeds {n} items (got {})", items.len()),
        )),
        _ => Ok(items),
    }
}

/// Array of at most `max_items` non-blank strings.
pub fn text_list(
    value: &Value,
    path: &str,
    max_items: usize,
    max_chars: usize,
) -> Result<Vec<String>, SchemaError> {
    array(value, path, Cardinality::AtMost(max_items))?
        .iter()
        .enumerate()
        .map(|(i, v)| text(v, &item(path, i), max_chars))
        .collect()
}
