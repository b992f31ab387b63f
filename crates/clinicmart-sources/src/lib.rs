//! Source adapters for the clinicmart pipelines.
//!
//! | Kind | Adapter | Selector |
//! |------|---------|----------|
//! | `postgres` | [`PostgresAdapter`] | table, optional window filter |
//! | `api` | [`ApiAdapter`] | query parameters of one call |
//! | `sheet` | [`SheetAdapter`] | the configured worksheet |
//!
//! Adapters never fail a run: every fetch returns a
//! [`FetchResult`](clinicmart_types::FetchResult) whose status says whether
//! the table is real, partial, or a fallback.

#![warn(clippy::pedantic)]

pub mod adapter;
pub mod api;
pub mod config;
mod http;
pub mod postgres;
pub mod registry;
pub mod sheet;

pub use adapter::{Selector, SourceAdapter, SourceKind, WindowFilter};
pub use api::ApiAdapter;
pub use config::{ApiSource, PostgresSource, SheetSource, SourceConfig};
pub use postgres::PostgresAdapter;
pub use registry::SourceRegistry;
pub use sheet::SheetAdapter;
