//! Value normalization
//!
//! Canonical in-memory values are scalars only: strings, numbers, booleans and
//! null. Aggregates are turned into their JSON text before they reach the
//! in-memory map, and are recovered from that text when a caller reads them
//! back out.
//!
//! Recovery uses the bracket heuristic that existing saves depend on: a string
//! whose trimmed form starts and ends with a matching `[]` or `{}` pair is
//! parsed as JSON. A plain string that happens to look like that is decoded
//! too.

use serde_json::{Number, Value};

/// Canonicalize a value before it enters the in-memory map.
///
/// Arrays and objects become their JSON text; scalars pass through untouched.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other,
    }
}

/// Serialize a canonical value into the string form that is persisted.
///
/// Null serializes to the empty string, matching the registry's default for
/// absent values.
pub fn serialize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Decode a canonical value for a caller.
///
/// Bracket-delimited strings are parsed as JSON and numeric-looking strings
/// become numbers. A string that looks like JSON but fails to parse is returned
/// unchanged and the failure is logged.
pub fn decode(value: &Value) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };

    if looks_like_json(text) {
        return match serde_json::from_str::<Value>(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                let preview: String = text.chars().take(100).collect();
                tracing::error!(error = %e, preview = %preview, "failed to parse stored JSON value");
                value.clone()
            }
        };
    }

    parse_number(text).unwrap_or_else(|| value.clone())
}

/// Check whether a string matches `^-?\d*\.?\d+$`
pub fn is_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.ends_with(|c: char| c.is_ascii_digit()) {
        return false;
    }

    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    true
}

/// Parse a numeric-looking string as an integer, or a float when it has a
/// decimal point
fn parse_number(text: &str) -> Option<Value> {
    if !is_numeric(text) {
        return None;
    }

    if text.contains('.') {
        let parsed: f64 = text.parse().ok()?;
        Number::from_f64(parsed).map(Value::Number)
    } else {
        match text.parse::<i64>() {
            Ok(parsed) => Some(Value::Number(parsed.into())),
            // Too wide for i64
            Err(_) => text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
        }
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'))
}

/// Derive the registry default for a value observed at runtime
pub fn default_text(value: &Value) -> String {
    serialize(value)
}

/// Human-readable type name used in export documents
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
        Value::Null => "Unknown",
    }
}
