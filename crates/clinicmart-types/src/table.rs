//! Named, ordered collections of records.

use crate::value::{Record, Value};

/// A named table with an ordered column list and its rows.
///
/// The column list is the table's schema as far as the pipeline knows it. A
/// source that failed produces a table with no columns and no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Record>,
}

/// Table produced by a source adapter.
pub type RawTable = Table;
/// One treatment line of the joined and enriched fact table.
pub type FactRow = Record;
/// One manufacturing-order row of the SKU dimension.
pub type DimensionRow = Record;

impl Table {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Zero rows, unknown schema.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Build a table from rows, deriving the column order from first appearance.
    #[must_use]
    pub fn from_rows(name: impl Into<String>, rows: Vec<Record>) -> Self {
        let mut table = Self::empty(name);
        for row in rows {
            table.push(row);
        }
        table
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Record] {
        &mut self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, extending the schema with any column not seen before.
    pub fn push(&mut self, row: Record) {
        for column in row.columns() {
            if !self.has_column(column) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(row);
    }

    /// Declare a column; existing rows read it as null until set.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    /// Set `column` on every row from `f`, declaring the column if needed.
    pub fn fill_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Record) -> Value,
    {
        self.add_column(column);
        for row in &mut self.rows {
            let value = f(row);
            row.set(column, value);
        }
    }

    /// Rename a column in the schema and every row.
    ///
    /// Returns `false` without touching the table when `from` is absent. An
    /// existing `to` column is replaced.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if from == to || !self.has_column(from) {
            return false;
        }
        self.columns.retain(|c| c != to);
        for column in &mut self.columns {
            if column == from {
                to.clone_into(column);
            }
        }
        for row in &mut self.rows {
            let value = row.remove(from).unwrap_or_default();
            row.set(to, value);
        }
        true
    }

    /// Keep only `columns`, in that order. Columns the table lacks are added
    /// as null.
    #[must_use]
    pub fn project(self, columns: &[String]) -> Self {
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).clone()))
                    .collect::<Record>()
            })
            .collect();
        Self {
            name: self.name,
            columns: columns.to_vec(),
            rows,
        }
    }
}
