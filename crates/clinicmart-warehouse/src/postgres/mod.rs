//! `PostgreSQL` warehouse. Each load runs in its own connection and
//! transaction; dropping an uncommitted transaction rolls it back.

mod ddl;
mod insert;

use std::time::Instant;

use async_trait::async_trait;
use clinicmart_types::{DeltaWindow, Table};
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use crate::config::WarehouseConfig;
use crate::error::{Result, WarehouseError};
use crate::writer::{LoadCounts, Warehouse};

use self::ddl::{
    create_table_sql, delete_window_sql, prepare_target, qualified, replacement_columns,
    staging_name, swap_sql, TargetColumn,
};
use self::insert::insert_rows;

pub struct PostgresWarehouse {
    config: WarehouseConfig,
}

impl PostgresWarehouse {
    #[must_use]
    pub fn new(config: WarehouseConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<Client> {
        let mut pg = PgConfig::new();
        pg.host(&self.config.host);
        pg.port(self.config.port);
        pg.user(&self.config.user);
        if !self.config.password.is_empty() {
            pg.password(&self.config.password);
        }
        pg.dbname(&self.config.database);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "warehouse connection error");
            }
        });
        Ok(client)
    }

    /// Target columns the incoming rows actually carry. Non-empty rows that
    /// share no column with the target would be written as nothing.
    fn columns_for(table: &str, rows: &Table, target: &[TargetColumn]) -> Result<Vec<TargetColumn>> {
        let columns: Vec<TargetColumn> = target
            .iter()
            .filter(|(name, _)| rows.has_column(name))
            .cloned()
            .collect();
        if columns.is_empty() && !rows.is_empty() {
            return Err(WarehouseError::NoSharedColumns {
                table: table.to_string(),
                columns: rows.columns().to_vec(),
            });
        }
        Ok(columns)
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn append(&self, table: &str, rows: &Table) -> Result<LoadCounts> {
        let started = Instant::now();
        let schema = self.config.schema.as_str();
        let mut client = self.connect().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| WarehouseError::pg("BEGIN", &e))?;

        let Some(target) = prepare_target(&tx, schema, table, rows).await? else {
            return Ok(LoadCounts::default());
        };
        let columns = Self::columns_for(table, rows, &target)?;
        let written = insert_rows(
            &tx,
            &qualified(schema, table),
            &columns,
            rows.rows(),
            self.config.insert_chunk_rows,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| WarehouseError::pg(format!("COMMIT append to {table}"), &e))?;
        tracing::info!(
            table,
            rows = written,
            elapsed_ms = started.elapsed().as_millis(),
            "appended rows"
        );
        Ok(LoadCounts {
            rows_written: written,
            rows_deleted: 0,
        })
    }

    async fn replace_window(
        &self,
        table: &str,
        column: &str,
        window: DeltaWindow,
        rows: &Table,
    ) -> Result<LoadCounts> {
        let started = Instant::now();
        let schema = self.config.schema.as_str();
        let mut client = self.connect().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| WarehouseError::pg("BEGIN", &e))?;

        let Some(target) = prepare_target(&tx, schema, table, rows).await? else {
            return Ok(LoadCounts::default());
        };
        if !target.iter().any(|(name, _)| name == column) {
            return Err(WarehouseError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let qualified_table = qualified(schema, table);
        let deleted = tx
            .execute(
                &delete_window_sql(&qualified_table, column),
                &[&window.start(), &window.end()],
            )
            .await
            .map_err(|e| WarehouseError::pg(format!("DELETE window {window} from {table}"), &e))?;

        let columns = Self::columns_for(table, rows, &target)?;
        let written = insert_rows(
            &tx,
            &qualified_table,
            &columns,
            rows.rows(),
            self.config.insert_chunk_rows,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| WarehouseError::pg(format!("COMMIT window replace of {table}"), &e))?;
        tracing::info!(
            table,
            window = %window,
            deleted,
            written,
            elapsed_ms = started.elapsed().as_millis(),
            "replaced window"
        );
        Ok(LoadCounts {
            rows_written: written,
            rows_deleted: deleted,
        })
    }

    async fn replace_all(&self, table: &str, rows: &Table) -> Result<LoadCounts> {
        let started = Instant::now();
        let schema = self.config.schema.as_str();
        let staging = staging_name(table);
        let target_table = qualified(schema, table);
        let staging_table = qualified(schema, &staging);

        let mut client = self.connect().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| WarehouseError::pg("BEGIN", &e))?;

        tx.execute(&format!("DROP TABLE IF EXISTS {staging_table}"), &[])
            .await
            .map_err(|e| WarehouseError::pg(format!("DROP staging for {table}"), &e))?;

        let existing = ddl::existing_columns(&tx, schema, table).await?;
        let previous = if existing.is_empty() {
            0
        } else {
            let row = tx
                .query_one(&format!("SELECT count(*) FROM {target_table}"), &[])
                .await
                .map_err(|e| WarehouseError::pg(format!("count {table}"), &e))?;
            u64::try_from(row.get::<_, i64>(0)).unwrap_or_default()
        };

        // staging takes the incoming schema; an empty snapshot keeps the old one
        let columns = if rows.columns().is_empty() {
            existing.clone()
        } else {
            replacement_columns(rows, &existing)
        };
        if columns.is_empty() {
            return Ok(LoadCounts::default());
        }
        if !existing.is_empty() {
            let dropped: Vec<&str> = existing
                .iter()
                .filter(|(name, _)| !columns.iter().any(|(c, _)| c == name))
                .map(|(name, _)| name.as_str())
                .collect();
            let added: Vec<&str> = columns
                .iter()
                .filter(|(name, _)| !existing.iter().any(|(c, _)| c == name))
                .map(|(name, _)| name.as_str())
                .collect();
            if !dropped.is_empty() || !added.is_empty() {
                tracing::info!(table, added = ?added, dropped = ?dropped, "replacement changes table columns");
            }
        }
        tx.execute(&create_table_sql(&staging_table, &columns), &[])
            .await
            .map_err(|e| WarehouseError::pg(format!("CREATE staging for {table}"), &e))?;

        let written = insert_rows(
            &tx,
            &staging_table,
            &columns,
            rows.rows(),
            self.config.insert_chunk_rows,
        )
        .await?;

        let [drop_target, rename_staging] = swap_sql(schema, table);
        tx.execute(&drop_target, &[])
            .await
            .map_err(|e| WarehouseError::pg(format!("swap DROP of {table}"), &e))?;
        tx.execute(&rename_staging, &[])
            .await
            .map_err(|e| WarehouseError::pg(format!("swap RENAME into {table}"), &e))?;

        tx.commit()
            .await
            .map_err(|e| WarehouseError::pg(format!("COMMIT swap of {table}"), &e))?;
        tracing::info!(
            table,
            rows = written,
            replaced = previous,
            elapsed_ms = started.elapsed().as_millis(),
            "swapped in full table"
        );
        Ok(LoadCounts {
            rows_written: written,
            rows_deleted: previous,
        })
    }

    async fn check(&self) -> Result<()> {
        let client = self.connect().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| WarehouseError::pg("connection test", &e))?;
        Ok(())
    }
}
