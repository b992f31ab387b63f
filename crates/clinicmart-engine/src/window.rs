//! Delta window selection.

use chrono::{DateTime, FixedOffset, Utc};
use clinicmart_types::DeltaWindow;

use crate::config::types::WindowConfig;
use crate::errors::PipelineError;

const SECS_PER_HOUR: i32 = 3600;

/// Trailing window of `lookback_days` ending at the reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSelector {
    lookback_days: u32,
    offset: FixedOffset,
}

impl WindowSelector {
    /// # Errors
    ///
    /// Returns `InvalidPlan` when the UTC offset is out of range.
    pub fn from_config(config: &WindowConfig) -> Result<Self, PipelineError> {
        let offset = config
            .utc_offset_hours
            .checked_mul(SECS_PER_HOUR)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                PipelineError::InvalidPlan(format!(
                    "utc_offset_hours {} is not a valid offset",
                    config.utc_offset_hours
                ))
            })?;
        Ok(Self {
            lookback_days: config.lookback_days,
            offset,
        })
    }

    /// `[today - lookback_days, today)` where `today` is `reference` seen at
    /// the configured offset.
    #[must_use]
    pub fn window(&self, reference: DateTime<Utc>) -> DeltaWindow {
        let today = reference.with_timezone(&self.offset).date_naive();
        DeltaWindow::trailing(today, self.lookback_days)
    }
}
