//! Positional-array helpers for kline payloads.

use crate::error::AcquireError;
use serde_json::Value;

pub(crate) fn array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, AcquireError> {
    value
        .as_array()
        .ok_or_else(|| AcquireError::ResponseFormatChanged(format!("{what} is not an array")))
}

fn field<'a>(row: &'a [Value], idx: usize, name: &str) -> Result<&'a Value, AcquireError> {
    row.get(idx).ok_or_else(|| {
        AcquireError::ResponseFormatChanged(format!("kline row has no {name} (index {idx})"))
    })
}

/// Numeric field sent either as a JSON number or a decimal string.
pub(crate) fn number_at(row: &[Value], idx: usize, name: &str) -> Result<f64, AcquireError> {
    let v = field(row, idx, name)?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| AcquireError::ResponseFormatChanged(format!("{name} is not numeric: {v}")))
}

pub(crate) fn millis_at(row: &[Value], idx: usize, name: &str) -> Result<i64, AcquireError> {
    let v = field(row, idx, name)?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| AcquireError::ResponseFormatChanged(format!("{name} is not a timestamp: {v}")))
}
