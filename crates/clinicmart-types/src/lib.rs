//! Shared data model for clinicmart pipelines.
//!
//! Everything that crosses a crate boundary lives here: scalar cell
//! [`value::Value`]s, [`table::Table`]s of [`value::Record`]s, the
//! [`window::DeltaWindow`], table refresh policies, and the typed fetch
//! outcome returned by every source adapter.

#![warn(clippy::pedantic)]

pub mod error;
pub mod outcome;
pub mod policy;
pub mod table;
pub mod value;
pub mod window;

pub use error::{ErrorCategory, SourceError};
pub use outcome::{FetchResult, FetchStatus};
pub use policy::RefreshPolicy;
pub use table::{DimensionRow, FactRow, RawTable, Table};
pub use value::{Record, Value};
pub use window::DeltaWindow;
