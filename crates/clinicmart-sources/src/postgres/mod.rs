//! Relational table reader for the operational `PostgreSQL` databases.

mod client;
mod query;
mod types;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use clinicmart_types::{FetchResult, Record, SourceError, Table, Value};
use tokio_postgres::Client;

use crate::adapter::{Selector, SourceAdapter, SourceKind, WindowFilter};
use crate::config::PostgresSource;

use self::types::Column;

pub struct PostgresAdapter {
    config: PostgresSource,
}

impl PostgresAdapter {
    #[must_use]
    pub fn new(config: PostgresSource) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn read_table(
        &self,
        table: &str,
        filter: Option<&WindowFilter>,
    ) -> Result<FetchResult<Table>, SourceError> {
        let client = client::connect(&self.config).await?;
        let columns = discover_columns(&client, &self.config.schema, table).await?;
        let query = query::build_select(&self.config.schema, table, &columns, filter);

        tracing::debug!(
            database = %self.config.database,
            table,
            filtered = filter.is_some(),
            sql = %query.sql,
            "reading source table"
        );

        let rows = client
            .query(&query.sql, &query.params())
            .await
            .map_err(|e| client::classify(&e, "query"))?;

        let mut out = Table::new(table, columns.iter().map(|c| c.name.clone()).collect());
        let mut bad_cells = 0_usize;
        let mut first_error: Option<String> = None;
        for row in &rows {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = match types::decode_cell(row, idx, column.decoder) {
                    Ok(v) => v,
                    Err(e) => {
                        bad_cells += 1;
                        first_error.get_or_insert_with(|| format!("column {}: {e}", column.name));
                        Value::Null
                    }
                };
                record.set(column.name.as_str(), value);
            }
            out.push(record);
        }

        Ok(match first_error {
            None => FetchResult::success(out),
            Some(detail) => FetchResult::degraded(
                out,
                SourceError::decode(format!("{bad_cells} cell(s) nulled, first: {detail}")),
            ),
        })
    }
}

async fn discover_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<Column>, SourceError> {
    let rows = client
        .query(query::COLUMNS_QUERY, &[&schema, &table])
        .await
        .map_err(|e| client::classify(&e, "schema query"))?;

    let columns: Vec<Column> = rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            Column::new(&name, &data_type)
        })
        .collect();

    if columns.is_empty() {
        return Err(SourceError::query(format!(
            "table '{schema}.{table}' not found or has no columns"
        )));
    }
    Ok(columns)
}

#[async_trait]
impl SourceAdapter for PostgresAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table> {
        let Selector::Table { table, filter } = selector else {
            return FetchResult::failed(Table::empty(""), selector.mismatch(self.kind()));
        };

        let started = Instant::now();
        match tokio::time::timeout(self.timeout(), self.read_table(table, filter.as_ref())).await {
            Ok(Ok(result)) => {
                tracing::info!(
                    database = %self.config.database,
                    table = %table,
                    rows = result.value.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "source table read"
                );
                result
            }
            Ok(Err(e)) => FetchResult::failed(Table::empty(table.as_str()), e),
            Err(_) => FetchResult::failed(
                Table::empty(table.as_str()),
                SourceError::timeout(format!(
                    "reading {table} exceeded {}s",
                    self.config.timeout_secs
                )),
            ),
        }
    }

    async fn check(&self) -> Result<(), SourceError> {
        let probe = async {
            let client = client::connect(&self.config).await?;
            client
                .query_one("SELECT 1", &[])
                .await
                .map_err(|e| client::classify(&e, "connection test"))?;
            Ok::<(), SourceError>(())
        };
        tokio::time::timeout(self.timeout(), probe)
            .await
            .map_err(|_| {
                SourceError::timeout(format!(
                    "connecting to {}:{} exceeded {}s",
                    self.config.host, self.config.port, self.config.timeout_secs
                ))
            })?
    }
}
