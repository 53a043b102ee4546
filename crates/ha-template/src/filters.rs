//! Numeric filters and tests with state-string aware parsing
//!
//! Entity states are strings, so `"42"` and `" 42.5 "` must convert like
//! numbers do. A failed conversion falls back to the default argument, and is
//! an error when none was given.

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};

/// Numeric reading of a value, parsing strings
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    if let Some(s) = value.as_str() {
        return s.trim().parse::<f64>().ok();
    }
    if let Some(i) = value.as_i64() {
        return Some(i as f64);
    }
    f64::try_from(value.clone()).ok()
}

fn conversion_failed(value: &Value, target: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot convert {} to {}", value, target),
    )
}

pub fn to_float(value: Value, default: Option<Value>) -> Result<Value, Error> {
    match as_number(&value) {
        Some(f) => Ok(Value::from(f)),
        None => default.ok_or_else(|| conversion_failed(&value, "float")),
    }
}

pub fn to_int(value: Value, default: Option<Value>) -> Result<Value, Error> {
    if let Some(i) = value.as_i64() {
        return Ok(Value::from(i));
    }
    match as_number(&value) {
        Some(f) => Ok(Value::from(f.trunc() as i64)),
        None => default.ok_or_else(|| conversion_failed(&value, "int")),
    }
}

/// `x is number`; numeric strings do not count
pub fn is_number(value: Value) -> bool {
    value.as_str().is_none() && as_number(&value).is_some()
}
