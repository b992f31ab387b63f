//! The warehouse write interface shared by the Postgres and in-memory backends.

use async_trait::async_trait;
use clinicmart_types::{DeltaWindow, Table};

use crate::error::Result;

/// Rows affected by one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub rows_written: u64,
    pub rows_deleted: u64,
}

/// Destination for fact and dimension tables.
///
/// Each call is atomic: either every statement it issues commits, or none do.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Insert `rows` into `table`, creating the table if needed.
    async fn append(&self, table: &str, rows: &Table) -> Result<LoadCounts>;

    /// Delete the rows of `table` whose `column` falls in `window`, then
    /// insert `rows`, in one transaction. Rows with a null `column` are kept.
    async fn replace_window(
        &self,
        table: &str,
        column: &str,
        window: DeltaWindow,
        rows: &Table,
    ) -> Result<LoadCounts>;

    /// Replace the whole contents of `table` with `rows`.
    async fn replace_all(&self, table: &str, rows: &Table) -> Result<LoadCounts>;

    /// Probe connectivity without writing.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}
