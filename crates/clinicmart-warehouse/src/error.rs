//! Warehouse error types.

/// Errors produced by [`Warehouse`](crate::Warehouse) operations. Any of
/// them means the load did not commit.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Could not open a warehouse connection.
    #[error("warehouse connection failed: {0}")]
    Connection(String),

    /// A statement failed; the transaction was rolled back.
    #[error("{context}: {message}")]
    Statement { context: String, message: String },

    /// The column a windowed replace deletes by is not on the table.
    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    /// Rows were given but none of their columns exist on the table.
    #[error("none of the incoming columns {columns:?} exist on table {table}")]
    NoSharedColumns { table: String, columns: Vec<String> },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("warehouse lock poisoned")]
    LockPoisoned,
}

impl WarehouseError {
    /// Wrap a driver error, keeping SQLSTATE and detail when the server sent them.
    pub(crate) fn pg(context: impl Into<String>, error: &tokio_postgres::Error) -> Self {
        let message = match error.as_db_error() {
            Some(db) => format!(
                "{} (sqlstate={} detail={})",
                db.message(),
                db.code().code(),
                db.detail().unwrap_or("n/a")
            ),
            None => error.to_string(),
        };
        Self::Statement {
            context: context.into(),
            message,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, WarehouseError>;
