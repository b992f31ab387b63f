//! Table creation, column discovery and the staging names used by full replace.

use std::fmt::Write as _;

use clinicmart_types::{Table, Value};
use pg_escape::quote_identifier;
use tokio_postgres::Transaction;

use crate::error::{Result, WarehouseError};

/// Warehouse-side type of a column, either inferred from rows or read back
/// from `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Date,
    Timestamp,
    TimestampTz,
    Text,
    /// Any other existing column type, by `udt_name`. Bound as text and cast.
    Other(String),
}

impl ColumnType {
    pub(crate) fn ddl(&self) -> &str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE PRECISION",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Text => "TEXT",
            Self::Other(udt) => udt,
        }
    }

    /// Placeholder with the cast that fixes the bound parameter's type.
    pub(crate) fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Boolean => format!("${n}::boolean"),
            Self::BigInt => format!("${n}::bigint"),
            Self::Double => format!("${n}::float8"),
            Self::Date => format!("${n}::date"),
            Self::Timestamp => format!("${n}::timestamp"),
            Self::TimestampTz => format!("${n}::timestamptz"),
            Self::Text => format!("${n}::text"),
            Self::Other(udt) => format!("${n}::text::{}", quote_identifier(udt)),
        }
    }

    pub(crate) fn from_info_schema(data_type: &str, udt_name: &str) -> Self {
        match data_type {
            "boolean" => Self::Boolean,
            "bigint" => Self::BigInt,
            "double precision" => Self::Double,
            "date" => Self::Date,
            "timestamp without time zone" => Self::Timestamp,
            "timestamp with time zone" => Self::TimestampTz,
            "text" => Self::Text,
            _ => Self::Other(udt_name.to_string()),
        }
    }

    fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Int(_) => Some(Self::BigInt),
            Value::Float(_) => Some(Self::Double),
            Value::Text(_) => Some(Self::Text),
            Value::Date(_) => Some(Self::Date),
            Value::Timestamp(_) => Some(Self::Timestamp),
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            (Self::Date, Self::Timestamp) | (Self::Timestamp, Self::Date) => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

/// A target column and its type.
pub(crate) type TargetColumn = (String, ColumnType);

/// Narrowest type holding every non-null value of `column`.
fn observed_type(rows: &Table, column: &str) -> Option<ColumnType> {
    rows.rows()
        .iter()
        .filter_map(|row| ColumnType::of_value(row.get(column)))
        .reduce(ColumnType::widen)
}

/// Column types for a new table. Mixed columns widen to the narrowest type
/// holding every value; all-null columns become TEXT.
pub(crate) fn infer_columns(rows: &Table) -> Vec<TargetColumn> {
    replacement_columns(rows, &[])
}

/// Columns of the table that replaces `previous`: exactly the incoming
/// columns, typed from their values. A column with no non-null value keeps
/// its previous type, else TEXT.
pub(crate) fn replacement_columns(rows: &Table, previous: &[TargetColumn]) -> Vec<TargetColumn> {
    rows.columns()
        .iter()
        .map(|column| {
            let ty = observed_type(rows, column)
                .or_else(|| {
                    previous
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, ty)| ty.clone())
                })
                .unwrap_or(ColumnType::Text);
            (column.clone(), ty)
        })
        .collect()
}

pub(crate) fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

pub(crate) fn staging_name(table: &str) -> String {
    format!("{table}__clinicmart_staging")
}

pub(crate) fn create_table_sql(qualified_table: &str, columns: &[TargetColumn]) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {qualified_table} (");
    for (i, (name, ty)) in columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "{} {}", quote_identifier(name), ty.ddl());
    }
    sql.push(')');
    sql
}

/// Delete the rows whose `column` falls in the `[$1, $2)` date window.
pub(crate) fn delete_window_sql(qualified_table: &str, column: &str) -> String {
    let column = quote_identifier(column);
    format!("DELETE FROM {qualified_table} WHERE {column} >= $1::date AND {column} < $2::date")
}

/// Statements that swap the staging table in place of `table`.
pub(crate) fn swap_sql(schema: &str, table: &str) -> [String; 2] {
    [
        format!("DROP TABLE IF EXISTS {}", qualified(schema, table)),
        format!(
            "ALTER TABLE {} RENAME TO {}",
            qualified(schema, &staging_name(table)),
            quote_identifier(table)
        ),
    ]
}

/// Existing columns of a table in ordinal order; empty when it does not exist.
pub(crate) async fn existing_columns(
    tx: &Transaction<'_>,
    schema: &str,
    table: &str,
) -> Result<Vec<TargetColumn>> {
    let rows = tx
        .query(
            "SELECT column_name, data_type, udt_name \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await
        .map_err(|e| WarehouseError::pg(format!("column discovery for {table}"), &e))?;

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let udt_name: String = row.get(2);
            (name, ColumnType::from_info_schema(&data_type, &udt_name))
        })
        .collect())
}

/// Make sure `table` exists and return the columns `rows` will be written to.
///
/// A missing table is created from the rows' inferred types. For an existing
/// table, incoming columns it lacks are dropped with a warning. Returns
/// `None` when the table is absent and there is nothing to create it from.
pub(crate) async fn prepare_target(
    tx: &Transaction<'_>,
    schema: &str,
    table: &str,
    rows: &Table,
) -> Result<Option<Vec<TargetColumn>>> {
    let existing = existing_columns(tx, schema, table).await?;
    if existing.is_empty() {
        if rows.columns().is_empty() {
            return Ok(None);
        }
        let columns = infer_columns(rows);
        let sql = create_table_sql(&qualified(schema, table), &columns);
        tx.execute(&sql, &[])
            .await
            .map_err(|e| WarehouseError::pg(format!("CREATE TABLE {table}"), &e))?;
        tracing::info!(table, columns = columns.len(), "created warehouse table");
        return Ok(Some(columns));
    }

    let skipped: Vec<&str> = rows
        .columns()
        .iter()
        .filter(|c| !existing.iter().any(|(name, _)| name == *c))
        .map(String::as_str)
        .collect();
    if !skipped.is_empty() {
        tracing::warn!(
            table,
            skipped = ?skipped,
            "incoming columns missing from warehouse table were not written"
        );
    }
    Ok(Some(existing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinicmart_types::Record;

    #[test]
    fn infer_widens_mixed_columns() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let rows = Table::from_rows(
            "t",
            vec![
                Record::from_iter([
                    ("qty", Value::Int(2)),
                    ("price", Value::Int(10)),
                    ("when", Value::Date(date)),
                    ("note", Value::Null),
                    ("flag", Value::Bool(true)),
                ]),
                Record::from_iter([
                    ("qty", Value::Int(3)),
                    ("price", Value::Float(12.5)),
                    ("when", Value::Timestamp(date.and_hms_opt(1, 0, 0).unwrap())),
                    ("flag", Value::from("yes")),
                ]),
            ],
        );
        let cols = infer_columns(&rows);
        let ty = |name: &str| cols.iter().find(|(n, _)| n == name).unwrap().1.clone();
        assert_eq!(ty("qty"), ColumnType::BigInt);
        assert_eq!(ty("price"), ColumnType::Double);
        assert_eq!(ty("when"), ColumnType::Timestamp);
        assert_eq!(ty("note"), ColumnType::Text);
        assert_eq!(ty("flag"), ColumnType::Text);
    }

    #[test]
    fn create_table_quotes_identifiers() {
        let sql = create_table_sql(
            &qualified("public", "fact_appointment_flow"),
            &[
                ("lead_id".to_string(), ColumnType::BigInt),
                ("Doctor Name".to_string(), ColumnType::Text),
            ],
        );
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS public.fact_appointment_flow \
             (lead_id BIGINT, \"Doctor Name\" TEXT)"
        );
    }

    #[test]
    fn info_schema_types_map_back() {
        assert_eq!(
            ColumnType::from_info_schema("timestamp without time zone", "timestamp"),
            ColumnType::Timestamp
        );
        assert_eq!(
            ColumnType::from_info_schema("integer", "int4"),
            ColumnType::Other("int4".to_string())
        );
        assert_eq!(ColumnType::Other("numeric".to_string()).placeholder(3), "$3::text::numeric");
        assert_eq!(ColumnType::Double.placeholder(1), "$1::float8");
    }

    #[test]
    fn staging_name_is_suffixed() {
        assert_eq!(
            staging_name("dim_manufacturing_sku"),
            "dim_manufacturing_sku__clinicmart_staging"
        );
    }

    #[test]
    fn replacement_takes_incoming_columns_only() {
        let previous = vec![
            ("sku".to_string(), ColumnType::Text),
            ("legacy_code".to_string(), ColumnType::BigInt),
            ("batch".to_string(), ColumnType::BigInt),
        ];
        let mut rows = Table::new(
            "dim",
            vec!["sku".to_string(), "sku_normalized".to_string(), "batch".to_string()],
        );
        rows.push(Record::from_iter([
            ("sku", Value::from("AB-1")),
            ("sku_normalized", Value::from("AB-1")),
            ("batch", Value::Null),
        ]));
        rows.push(Record::from_iter([("sku", Value::from("cd 2")), ("batch", Value::Null)]));
        assert_eq!(
            replacement_columns(&rows, &previous),
            vec![
                ("sku".to_string(), ColumnType::Text),
                ("sku_normalized".to_string(), ColumnType::Text),
                ("batch".to_string(), ColumnType::BigInt),
            ]
        );
        assert_eq!(
            infer_columns(&rows)[2],
            ("batch".to_string(), ColumnType::Text)
        );
    }

    #[test]
    fn window_delete_is_half_open_and_parameterized() {
        assert_eq!(
            delete_window_sql(&qualified("public", "dm_interaction_treatment_payment"), "interaction_date"),
            "DELETE FROM public.dm_interaction_treatment_payment \
             WHERE interaction_date >= $1::date AND interaction_date < $2::date"
        );
        assert_eq!(
            delete_window_sql("mart.fact", "Visit Date"),
            "DELETE FROM mart.fact WHERE \"Visit Date\" >= $1::date AND \"Visit Date\" < $2::date"
        );
    }

    #[test]
    fn swap_drops_target_then_renames_staging() {
        let [drop, rename] = swap_sql("public", "dim_manufacturing_sku");
        assert_eq!(drop, "DROP TABLE IF EXISTS public.dim_manufacturing_sku");
        assert_eq!(
            rename,
            "ALTER TABLE public.dim_manufacturing_sku__clinicmart_staging \
             RENAME TO dim_manufacturing_sku"
        );
    }
}
