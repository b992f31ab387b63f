//! Load coordinator: applies each target's refresh policy.

use clinicmart_types::{DeltaWindow, RefreshPolicy, Table};
use clinicmart_warehouse::Warehouse;

use crate::config::types::LoadTarget;
use crate::errors::PipelineError;

#[derive(Debug, Clone)]
pub struct TableLoadReport {
    pub table: String,
    pub policy: RefreshPolicy,
    pub rows_written: u64,
    pub rows_deleted: u64,
    /// Rows written by `replace_window` whose window column lies outside the window.
    pub rows_outside_window: usize,
}

/// Write `rows` into `target` under its policy.
///
/// # Errors
///
/// Returns `Load` when the warehouse rejects the write (nothing is
/// committed), or `InvalidPlan` for a windowed target without a window.
pub async fn load_table(
    warehouse: &dyn Warehouse,
    target: &LoadTarget,
    rows: Table,
    window: Option<DeltaWindow>,
) -> Result<TableLoadReport, PipelineError> {
    let rows = if target.columns.is_empty() {
        rows
    } else {
        rows.project(&target.columns)
    };
    let table = target.table.as_str();
    let to_load_error = |source| PipelineError::Load {
        table: table.to_string(),
        source,
    };

    let mut rows_outside_window = 0;
    let counts = match target.policy {
        RefreshPolicy::Append => {
            tracing::info!(
                table,
                rows = rows.len(),
                "appending without deduplication; rerunning a window duplicates its rows"
            );
            warehouse.append(table, &rows).await.map_err(to_load_error)?
        }
        RefreshPolicy::ReplaceWindow => {
            let (column, window) = match (&target.window_column, window) {
                (Some(column), Some(window)) => (column.as_str(), window),
                _ => {
                    return Err(PipelineError::InvalidPlan(format!(
                        "'{table}' uses replace_window without a window column and run window"
                    )))
                }
            };
            rows_outside_window = rows
                .rows()
                .iter()
                .filter_map(|r| r.get(column).as_date())
                .filter(|d| !window.contains(*d))
                .count();
            if rows_outside_window > 0 {
                tracing::warn!(
                    table,
                    column,
                    window = %window,
                    rows = rows_outside_window,
                    "rows outside the window will survive the next windowed delete"
                );
            }
            warehouse
                .replace_window(table, column, window, &rows)
                .await
                .map_err(to_load_error)?
        }
        RefreshPolicy::Replace => warehouse
            .replace_all(table, &rows)
            .await
            .map_err(to_load_error)?,
    };

    Ok(TableLoadReport {
        table: target.table.clone(),
        policy: target.policy,
        rows_written: counts.rows_written,
        rows_deleted: counts.rows_deleted,
        rows_outside_window,
    })
}
