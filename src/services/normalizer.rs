//! Maps rows returned by any backend back to canonical PascalCase keys.
//!
//! Unquoted aliases come back lowercased from PostgreSQL and uppercased from
//! Oracle, and `SELECT *` returns the physical column names. Lookups here are
//! therefore loose: exact key first, then a comparison ignoring case and
//! underscores.

use serde_json::{Map, Value};

use crate::models::entity::fold_key;
use crate::models::{value_as_f64, value_as_i64};
use crate::services::dialect::Dialect;

/// Renames every key of an object row to its canonical form for `dialect`.
pub fn normalize_row(dialect: &dyn Dialect, row: Value) -> Value {
    match row {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (dialect.normalize_key(&key), value))
                .collect(),
        ),
        other => other,
    }
}

pub fn normalize_rows(dialect: &dyn Dialect, rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter().map(|row| normalize_row(dialect, row)).collect()
}

/// Finds the value for a canonical field regardless of how the backend cased it.
pub fn pick<'a>(row: &'a Value, canonical: &str) -> Option<&'a Value> {
    let map = row.as_object()?;
    if let Some(value) = map.get(canonical) {
        return Some(value);
    }
    let wanted = fold_key(canonical);
    map.iter()
        .find(|(key, _)| fold_key(key) == wanted)
        .map(|(_, value)| value)
}

pub fn pick_i64(row: &Value, canonical: &str) -> Option<i64> {
    pick(row, canonical).and_then(value_as_i64)
}

pub fn pick_f64(row: &Value, canonical: &str) -> Option<f64> {
    pick(row, canonical).and_then(value_as_f64)
}

pub fn pick_str<'a>(row: &'a Value, canonical: &str) -> Option<&'a str> {
    pick(row, canonical).and_then(Value::as_str)
}

/// Builds an object with exactly `fields`. Missing columns become `null`.
pub fn project(row: &Value, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            (
                field.to_string(),
                pick(row, field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Value of the first column, used for single-column catalog queries.
pub fn first_value(row: &Value) -> Option<&Value> {
    row.as_object().and_then(|map| map.values().next())
}

/// `COUNT(*) AS total` read back from whichever row shape the driver produced.
pub fn count_from_rows(rows: &[Value]) -> i64 {
    rows.first()
        .and_then(|row| pick_i64(row, "total").or_else(|| first_value(row).and_then(value_as_i64)))
        .unwrap_or(0)
}
