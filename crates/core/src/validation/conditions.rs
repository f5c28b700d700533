//! Condition matcher: decides whether a rule applies to a record.
//!
//! Conditions are an AND-only map of field to expected value. Matching reads
//! the record, then the caller's context map; it never writes anything.

use serde_json::{Map, Value};

use super::rules::{Conditions, Record};

/// `true` iff every condition key resolves to a value equal to the expected one.
///
/// An empty map always matches. A key found in neither the record nor the
/// context never matches.
pub fn conditions_match(
    conditions: &Conditions,
    record: &Record,
    context: &Map<String, Value>,
) -> bool {
    conditions.iter().all(|(field, expected)| {
        let actual = record.get(field).or_else(|| context.get(field).cloned());
        match actual {
            Some(actual) => values_equal(&actual, expected),
            None => false,
        }
    })
}

/// JSON equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
