//! Structural equality used to suppress no-op updates.
//!
//! Schema-change detection, option-list publication and the sub-model
//! merge all compare by content through here.

use serde_json::Value;

/// True when two values have the same JSON content.
///
/// Objects compare key-wise regardless of insertion order; numbers compare
/// by numeric value so `1` and `1.0` are the same content.
pub fn same_content(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_content(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map(|w| same_content(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Content comparison for optional values, where `None` is "undefined".
pub fn same_optional(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_content(a, b),
        (None, None) => true,
        _ => false,
    }
}
