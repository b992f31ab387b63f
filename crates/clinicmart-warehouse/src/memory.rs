//! In-memory warehouse used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use clinicmart_types::{DeltaWindow, Record, Table};

use crate::error::{Result, WarehouseError};
use crate::writer::{LoadCounts, Warehouse};

/// Tables kept as row vectors behind a mutex. Every operation applies under
/// one lock acquisition, so each call is atomic like a transaction.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<BTreeMap<String, Vec<Record>>>,
    failing: BTreeSet<String>,
}

impl MemoryWarehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `table` fail without touching its rows.
    #[must_use]
    pub fn failing_on(mut self, table: impl Into<String>) -> Self {
        self.failing.insert(table.into());
        self
    }

    /// Pre-populate a table.
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> Result<()> {
        self.lock()?.insert(table.to_string(), rows);
        Ok(())
    }

    /// Copy of a table's current rows; empty if it does not exist.
    pub fn snapshot(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.lock()?.get(table).cloned().unwrap_or_default())
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<Record>>>> {
        self.tables.lock().map_err(|_| WarehouseError::LockPoisoned)
    }

    fn ensure_writable(&self, table: &str) -> Result<()> {
        if self.failing.contains(table) {
            return Err(WarehouseError::Statement {
                context: format!("write to {table}"),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn row_count(rows: &Table) -> u64 {
    rows.len() as u64
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn append(&self, table: &str, rows: &Table) -> Result<LoadCounts> {
        self.ensure_writable(table)?;
        let mut tables = self.lock()?;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.rows().iter().cloned());
        Ok(LoadCounts {
            rows_written: row_count(rows),
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
        self.ensure_writable(table)?;
        if !rows.is_empty() && !rows.has_column(column) {
            return Err(WarehouseError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        let mut tables = self.lock()?;
        let existing = tables.entry(table.to_string()).or_default();
        let before = existing.len();
        existing.retain(|row| !row.get(column).as_date().is_some_and(|d| window.contains(d)));
        let deleted = (before - existing.len()) as u64;
        existing.extend(rows.rows().iter().cloned());
        Ok(LoadCounts {
            rows_written: row_count(rows),
            rows_deleted: deleted,
        })
    }

    async fn replace_all(&self, table: &str, rows: &Table) -> Result<LoadCounts> {
        self.ensure_writable(table)?;
        let mut tables = self.lock()?;
        let previous = tables.insert(table.to_string(), rows.rows().to_vec());
        Ok(LoadCounts {
            rows_written: row_count(rows),
            rows_deleted: previous.map_or(0, |p| p.len() as u64),
        })
    }
}
