pub mod check;
pub mod run;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use clinicmart_engine::{parse_config, validate_config, ClinicmartConfig, PipelineError};

/// How a successful command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Clean,
    /// Completed, but some source or lookup fell back to empty tables or sentinels.
    Degraded,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Degraded => 2,
        }
    }
}

/// Context marker for errors raised while loading or validating the config.
#[derive(Debug)]
pub struct InvalidConfig;

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration")
    }
}

/// Exit code for a failed command: 3 config, 4 load, 1 anything else.
pub fn failure_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<InvalidConfig>().is_some() {
        return 3;
    }
    match err.downcast_ref::<PipelineError>() {
        Some(e) if e.is_config() => 3,
        Some(e) if e.is_load() => 4,
        _ => 1,
    }
}

/// Parse and validate the config file.
pub fn load_config(path: &Path) -> Result<ClinicmartConfig> {
    let config = parse_config(path).context(InvalidConfig)?;
    validate_config(&config).context(InvalidConfig)?;
    tracing::info!(
        config = %path.display(),
        sources = config.sources.len(),
        pipelines = config.pipelines.len(),
        "Config validated"
    );
    Ok(config)
}
