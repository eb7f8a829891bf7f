//! Canonical in-memory row representation shared by every component
//! that touches `row_data` JSON.

use crate::error::ReplicationError;
use serde_json::{Map, Value};

/// A decoded row snapshot. Always a JSON object keyed by column name.
pub type RowData = Map<String, Value>;

/// Decode a `change_log.row_data` value, which arrives either already
/// parsed (a `Value::Object`) or as a JSON string.
pub fn decode_row(raw: &Value) -> Result<RowData, ReplicationError> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s)? {
            Value::Object(map) => Ok(map),
            other => Err(ReplicationError::SchemaMismatch(format!(
                "row_data did not decode to an object: {other}"
            ))),
        },
        other => Err(ReplicationError::SchemaMismatch(format!(
            "row_data is neither an object nor a JSON string: {other}"
        ))),
    }
}

/// Extract `row_version`, defaulting to 1 when absent or non-numeric,
/// matching `int(row.get("row_version") or 1)` in the original.
pub fn row_version(row: &RowData) -> i64 {
    row.get("row_version").and_then(Value::as_i64).unwrap_or(1)
}

/// Extract `updated_by_db`, upper-cased, defaulting to empty string.
pub fn updated_by_db(row: &RowData) -> String {
    row.get("updated_by_db")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Get a column's value as a string, for binding the primary key.
pub fn get_str<'a>(row: &'a RowData, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// Convert a SQLite dynamic value read back from a row into the
/// canonical JSON representation.
pub fn from_sql_value(v: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as SqlValue;
    match v {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Number(i.into()),
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Convert a JSON value into an owned `rusqlite::types::Value` for
/// parameter binding.
pub fn to_sql_value(v: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
