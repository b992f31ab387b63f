//! Extraction, join, enrichment and load orchestration for clinicmart pipelines.
//!
//! A run computes its delta window once, fetches every extract step once,
//! joins and transforms the fact table, enriches it through batched partner
//! lookups, and loads fact and dimension tables under their refresh policies.

#![warn(clippy::pedantic)]

pub mod coerce;
pub mod config;
pub mod derive;
pub mod enrich;
pub mod errors;
pub mod extract;
pub mod join;
pub mod load;
pub mod orchestrator;
pub mod result;
pub mod window;

// Re-export public API for convenience
pub use config::parser::parse_config;
pub use config::types::{ClinicmartConfig, PipelineConfig};
pub use config::validator::validate_config;
pub use enrich::normalize_sku;
pub use errors::PipelineError;
pub use orchestrator::{run_all, run_pipeline};
pub use result::RunReport;
pub use window::WindowSelector;
