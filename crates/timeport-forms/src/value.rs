//! Coercions over loosely typed field values
//!
//! Form inputs arrive as JSON values whose runtime type depends on the widget
//! (numbers may come in as strings, checkboxes as arrays). Every engine goes
//! through these helpers so coercion is identical everywhere.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Number, Value};

/// Whether a value counts as "not filled in"
///
/// `null`, blank strings, empty arrays and empty objects are empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Display text of a value
///
/// `null` becomes the empty string, lists are comma-joined.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_text(n),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// Numeric reading of a value
///
/// Numbers and numeric strings qualify; everything else is `None`.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Character count of the display text
pub fn text_length(value: &Value) -> usize {
    to_text(value).chars().count()
}

/// JSON value for a computed number, integral results as integers
pub fn number_value(result: f64) -> Value {
    if result.fract() == 0.0 && result.abs() < 9.0e15 {
        Value::from(result as i64)
    } else {
        Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Calendar date of a value (`YYYY-MM-DD`, or the date part of a date-time)
pub fn to_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| to_datetime(value).map(|dt| dt.date()))
}

/// Time of day (`HH:MM` or `HH:MM:SS`)
pub fn to_time(value: &Value) -> Option<NaiveTime> {
    let text = value.as_str()?.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// Date-time as written; RFC 3339 input keeps its wall-clock time
pub fn to_datetime(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
