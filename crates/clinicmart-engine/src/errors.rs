//! Pipeline error model.
//!
//! Source failures never appear here: adapters recover them locally and
//! report them through the run report. Everything below is fatal for the
//! pipeline it occurs in.

use clinicmart_warehouse::WarehouseError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A step names a source, table or pipeline that is not configured.
    #[error("{kind} '{name}' is not configured")]
    ConfigMissing { kind: &'static str, name: String },

    /// The pipeline definition cannot be executed as written.
    #[error("invalid pipeline plan: {0}")]
    InvalidPlan(String),

    /// A warehouse write failed and was rolled back.
    #[error("load into {table} failed: {source}")]
    Load {
        table: String,
        #[source]
        source: WarehouseError,
    },

    /// The run exceeded `run_timeout_secs`.
    #[error("pipeline '{pipeline}' exceeded its {secs}s deadline")]
    Deadline { pipeline: String, secs: u64 },

    /// Anything else (config file I/O, task failures).
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PipelineError {
    pub(crate) fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        Self::ConfigMissing {
            kind,
            name: name.into(),
        }
    }

    /// Configuration problems detected before any data moved.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigMissing { .. } | Self::InvalidPlan(_))
    }

    #[must_use]
    pub fn is_load(&self) -> bool {
        matches!(self, Self::Load { .. })
    }
}
