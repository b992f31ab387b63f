//! Timestamp coercion of date-like columns after the join.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use clinicmart_types::{Table, Value};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Columns whose lower-cased name contains `date` or `created`.
#[must_use]
pub fn is_temporal_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("date") || lower.contains("created")
}

/// Parse a cell into a timestamp. Anything unparseable becomes null.
#[must_use]
pub fn to_timestamp(value: &Value) -> Value {
    match value {
        Value::Timestamp(_) | Value::Null => value.clone(),
        Value::Date(d) => Value::Timestamp(d.and_time(NaiveTime::MIN)),
        Value::Text(s) => parse_text(s.trim()).map_or(Value::Null, Value::Timestamp),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Value::Null,
    }
}

fn parse_text(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Coerce every temporal column in place. Returns how many non-null cells
/// could not be parsed and were nulled.
pub fn coerce_temporal_columns(table: &mut Table) -> usize {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| is_temporal_column(c))
        .cloned()
        .collect();

    let mut nulled = 0;
    for row in table.rows_mut() {
        for column in &columns {
            let current = row.get(column);
            if current.is_null() {
                continue;
            }
            let coerced = to_timestamp(current);
            if coerced.is_null() {
                nulled += 1;
            }
            row.set(column.as_str(), coerced);
        }
    }

    if nulled > 0 {
        tracing::warn!(
            table = table.name(),
            columns = ?columns,
            nulled,
            "unparseable date values set to null"
        );
    }
    nulled
}
