//! Permissive field extraction from a JSON object.
//!
//! Submitted payloads come from another vendor's app and are loosely typed:
//! numbers arrive as strings, integers arrive as floats, fields go missing.
//! Every accessor here returns a value; a missing, `null` or unusable field
//! yields the documented default instead of an error.

use serde_json::{Map, Value};

/// `true` if `key` exists and is not `null`.
pub fn has(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(v) if !v.is_null())
}

/// Integer field, default `0`.
///
/// Floats are truncated toward zero, numeric strings are parsed, values
/// outside `i32` wrap the same way a 64→32-bit narrowing does.
pub fn opt_i32(obj: &Map<String, Value>, key: &str) -> i32 {
    opt_i64(obj, key) as i32
}

/// Long field, default `0`.
pub fn opt_i64(obj: &Map<String, Value>, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u as i64))
            .or_else(|| n.as_f64().map(truncate))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_i64(s).unwrap_or(0),
        _ => 0,
    }
}

/// Floating field, default `0.0`.
pub fn opt_f64(obj: &Map<String, Value>, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// String field, default `""`.
///
/// Non-string scalars are rendered with their JSON text (`12`, `true`),
/// nested objects and arrays as compact JSON.
pub fn opt_string(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Boolean field, default `false`. Accepts `"true"` / `"false"` in any case.
pub fn opt_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_i64(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(truncate))
}

/// Saturating float → long; NaN becomes 0.
fn truncate(f: f64) -> i64 {
    f as i64
}
