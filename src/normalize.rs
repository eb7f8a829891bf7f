//! Row Normalizer: coerces dialect-specific encodings into
//! a canonical form before apply. Total and idempotent, never raises
//! on a well-formed row map.

use crate::row::RowData;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalize a decoded row in place.
///
/// - Keys ending in `_at` whose values are strings are parsed as
///   RFC3339 (accepting a trailing `Z` by rewriting it to `+00:00`);
///   unparseable strings pass through unchanged.
/// - Boolean values become integers 0/1.
/// - Everything else passes through.
pub fn normalize(row: &mut RowData) {
    for (key, value) in row.iter_mut() {
        if key.ends_with("_at") {
            if let Value::String(s) = value {
                if let Some(parsed) = parse_timestamp(s) {
                    *value = Value::String(parsed.to_rfc3339());
                    continue;
                }
            }
        }
        if let Value::Bool(b) = value {
            *value = Value::Number((*b as i64).into());
        }
    }
}

/// Parse an ISO-8601 timestamp, rewriting a trailing `Z` to `+00:00`
/// so `chrono`'s RFC3339 parser accepts it the same way the original
/// `datetime.fromisoformat` does after that substitution.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let rewritten = if s.ends_with('Z') {
        format!("{}+00:00", &s[..s.len() - 1])
    } else {
        s.to_string()
    };
    DateTime::parse_from_rfc3339(&rewritten)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
