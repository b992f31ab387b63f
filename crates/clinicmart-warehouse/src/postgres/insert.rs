//! Multi-row INSERT write path.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clinicmart_types::{Record, Value};
use pg_escape::quote_identifier;
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use crate::error::{Result, WarehouseError};
use crate::postgres::ddl::{ColumnType, TargetColumn};

/// Postgres limits a statement to 65535 bind parameters.
const MAX_PARAMS: usize = 65_535;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
}

impl SqlParam {
    pub(crate) fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Bool(v) => v,
            Self::Int(v) => v,
            Self::Float(v) => v,
            Self::Text(v) => v,
            Self::Date(v) => v,
            Self::Timestamp(v) => v,
            Self::TimestampTz(v) => v,
        }
    }

    fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::TimestampTz(v) => v.is_none(),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        Value::Text(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

/// Convert a cell to a parameter of the target column's bind type. Values
/// that cannot be represented bind as null.
pub(crate) fn bind(value: &Value, ty: &ColumnType) -> SqlParam {
    match ty {
        ColumnType::Boolean => SqlParam::Bool(match value {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }),
        ColumnType::BigInt => SqlParam::Int(value.as_i64()),
        ColumnType::Double => SqlParam::Float(value.as_f64()),
        ColumnType::Date => SqlParam::Date(match value {
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            other => other.as_date(),
        }),
        ColumnType::Timestamp => SqlParam::Timestamp(as_timestamp(value)),
        ColumnType::TimestampTz => SqlParam::TimestampTz(as_timestamp(value).map(|ts| ts.and_utc())),
        ColumnType::Text | ColumnType::Other(_) => {
            SqlParam::Text((!value.is_null()).then(|| value.to_string()))
        }
    }
}

/// Rows per statement for `n_columns`, capped by `chunk_rows` and the
/// bind parameter limit.
pub(crate) fn rows_per_chunk(chunk_rows: usize, n_columns: usize) -> usize {
    (MAX_PARAMS / n_columns.max(1)).min(chunk_rows).max(1)
}

/// Build one INSERT for `rows`. Returns the SQL, its parameters and how many
/// non-null values had to be nulled.
pub(crate) fn build_insert(
    qualified_table: &str,
    columns: &[TargetColumn],
    rows: &[Record],
) -> (String, Vec<SqlParam>, usize) {
    let col_list = columns
        .iter()
        .map(|(name, _)| quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("INSERT INTO {qualified_table} ({col_list}) VALUES ");
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    let mut nulled = 0;

    for (row_idx, row) in rows.iter().enumerate() {
        if row_idx > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (pos, (name, ty)) in columns.iter().enumerate() {
            if pos > 0 {
                sql.push_str(", ");
            }
            let value = row.get(name);
            let param = bind(value, ty);
            if param.is_null() && !value.is_null() {
                nulled += 1;
            }
            params.push(param);
            let _ = write!(sql, "{}", ty.placeholder(params.len()));
        }
        sql.push(')');
    }
    (sql, params, nulled)
}

/// Write `rows` in chunks and return rows written.
pub(crate) async fn insert_rows(
    tx: &Transaction<'_>,
    qualified_table: &str,
    columns: &[TargetColumn],
    rows: &[Record],
    chunk_rows: usize,
) -> Result<u64> {
    if rows.is_empty() || columns.is_empty() {
        return Ok(0);
    }

    let mut total: u64 = 0;
    let mut nulled_total = 0;
    for chunk in rows.chunks(rows_per_chunk(chunk_rows, columns.len())) {
        let (sql, params, nulled) = build_insert(qualified_table, columns, chunk);
        nulled_total += nulled;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_tosql).collect();
        tx.execute(&sql, &param_refs).await.map_err(|e| {
            WarehouseError::pg(
                format!("INSERT into {qualified_table} ({} rows)", chunk.len()),
                &e,
            )
        })?;
        total += chunk.len() as u64;
    }

    if nulled_total > 0 {
        tracing::warn!(
            table = qualified_table,
            values = nulled_total,
            "values incompatible with their warehouse column type were written as null"
        );
    }
    tracing::debug!(table = qualified_table, rows = total, "inserted rows");
    Ok(total)
}
