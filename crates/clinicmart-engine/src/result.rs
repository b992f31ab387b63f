//! Pipeline run report.

use clinicmart_types::{DeltaWindow, FetchStatus};

use crate::enrich::LookupReport;
use crate::extract::SourceReport;
use crate::load::TableLoadReport;

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pipeline: String,
    pub window: Option<DeltaWindow>,
    pub sources: Vec<SourceReport>,
    pub lookups: Vec<LookupReport>,
    pub loads: Vec<TableLoadReport>,
    pub fact_rows: usize,
    /// Date cells that could not be parsed and were nulled.
    pub nulled_dates: usize,
    /// Dimension left at its previous snapshot because its source failed.
    pub dimension_skipped: bool,
    pub duration_secs: f64,
}

impl RunReport {
    /// Whether any source or lookup fell back to empty tables or sentinels.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.dimension_skipped
            || self.sources.iter().any(|s| s.status != FetchStatus::Success)
            || self.lookups.iter().any(LookupReport::is_degraded)
    }

    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.loads.iter().map(|l| l.rows_written).sum()
    }
}
