//! The uniform fetch interface every source kind implements.

use std::fmt;

use async_trait::async_trait;
use clinicmart_types::{DeltaWindow, FetchResult, SourceError, Table};

/// Which family of adapter a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Postgres,
    Api,
    Sheet,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Api => "api",
            Self::Sheet => "sheet",
        })
    }
}

/// Restricts a relational read to rows whose `column` lies in `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFilter {
    pub column: String,
    pub window: DeltaWindow,
}

/// What to fetch from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A relational table, optionally filtered by the run's window.
    Table {
        table: String,
        filter: Option<WindowFilter>,
    },
    /// Query parameters of a single API call.
    Params(Vec<(String, String)>),
    /// The whole configured worksheet.
    Worksheet,
}

impl Selector {
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self::Table {
            table: table.into(),
            filter: None,
        }
    }

    #[must_use]
    pub fn param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Params(vec![(name.into(), value.into())])
    }

    pub(crate) fn mismatch(&self, kind: SourceKind) -> SourceError {
        SourceError::query(format!("{kind} source cannot serve selector {self:?}"))
    }
}

/// A connection to one external system.
///
/// `fetch` never returns an error: failures are reported through the
/// [`FetchResult`] status alongside an empty table or a sentinel row.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table>;

    /// Probe connectivity without reading data.
    async fn check(&self) -> Result<(), SourceError> {
        Ok(())
    }
}
