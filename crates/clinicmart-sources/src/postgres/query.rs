//! SQL for table discovery and windowed reads.

use chrono::NaiveDate;
use pg_escape::quote_identifier;
use tokio_postgres::types::ToSql;

use crate::adapter::WindowFilter;
use crate::postgres::types::Column;

pub(crate) const COLUMNS_QUERY: &str = "SELECT column_name, data_type \
    FROM information_schema.columns \
    WHERE table_schema = $1 AND table_name = $2 \
    ORDER BY ordinal_position";

/// A SELECT plus its bind parameters.
#[derive(Debug)]
pub(crate) struct TableQuery {
    pub(crate) sql: String,
    pub(crate) binds: Vec<NaiveDate>,
}

impl TableQuery {
    pub(crate) fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.binds.iter().map(|d| d as &(dyn ToSql + Sync)).collect()
    }
}

pub(crate) fn build_select(
    schema: &str,
    table: &str,
    columns: &[Column],
    filter: Option<&WindowFilter>,
) -> TableQuery {
    let col_list = columns
        .iter()
        .map(|c| {
            let ident = quote_identifier(&c.name);
            if c.needs_cast {
                format!("{ident}::text AS {ident}")
            } else {
                ident.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let relation = format!("{}.{}", quote_identifier(schema), quote_identifier(table));

    match filter {
        Some(f) => {
            let column = quote_identifier(&f.column);
            TableQuery {
                sql: format!(
                    "SELECT {col_list} FROM {relation} \
                     WHERE {column} >= $1::date AND {column} < $2::date"
                ),
                binds: vec![f.window.start(), f.window.end()],
            }
        }
        None => TableQuery {
            sql: format!("SELECT {col_list} FROM {relation}"),
            binds: Vec::new(),
        },
    }
}
