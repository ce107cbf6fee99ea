//! Row-to-entity parsing and SQL value helpers.
//!
//! Every storage read converts `libsql::Row` (column-indexed) into typed
//! entity structs; every compensating write converts JSON snapshot values
//! back into SQL parameters. Both directions live here so JSON
//! (de)serialization stays isolated at the storage boundary.

use chrono::{DateTime, Utc};

use quill_core::RowData;

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s
/// default format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all quill-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
/// You must use `get::<Option<String>>()` for nullable columns.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Extract an optional JSON value from a TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string contains invalid JSON.
pub fn parse_optional_json(s: Option<&str>) -> Result<Option<serde_json::Value>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => {
            let val = serde_json::from_str(s)
                .map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))?;
            Ok(Some(val))
        }
        _ => Ok(None),
    }
}

/// Extract an optional full-row snapshot (`old_data`/`new_data`) from a TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the column holds JSON that is not an object.
pub fn parse_row_data(s: Option<&str>) -> Result<Option<RowData>, DatabaseError> {
    match parse_optional_json(s)? {
        Some(serde_json::Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(DatabaseError::Query(format!(
            "Row snapshot must be a JSON object, got: {other}"
        ))),
        None => Ok(None),
    }
}

/// Convert a JSON snapshot value into a SQL parameter.
///
/// Scalars map to their SQL counterparts; nested arrays/objects are stored
/// as JSON text, matching how full-row snapshots were captured.
#[must_use]
pub fn json_to_sql(value: &serde_json::Value) -> libsql::Value {
    match value {
        serde_json::Value::Null => libsql::Value::Null,
        serde_json::Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                libsql::Value::Integer(i)
            } else {
                libsql::Value::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => libsql::Value::Text(s.clone()),
        nested => libsql::Value::Text(nested.to_string()),
    }
}

/// Quote a tracked table or column name as a SQL identifier.
///
/// Tracked table names are free-form strings supplied by callers (the
/// subsystem has no schema catalogue to validate against), so they must
/// never be spliced into SQL unchecked.
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` for empty names or names with
/// characters outside `[A-Za-z0-9_]`.
pub fn quote_ident(name: &str) -> Result<String, DatabaseError> {
    if name.is_empty() {
        return Err(DatabaseError::InvalidState(
            "empty SQL identifier".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(DatabaseError::InvalidState(format!(
            "invalid SQL identifier: '{name}'"
        )));
    }
    Ok(format!("\"{name}\""))
}
