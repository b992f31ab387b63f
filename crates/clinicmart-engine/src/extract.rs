//! Extraction coordinator: one adapter call per extract step.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use clinicmart_sources::{Selector, SourceAdapter, SourceKind, SourceRegistry, WindowFilter};
use clinicmart_types::{DeltaWindow, FetchStatus, Table};

use crate::config::types::ExtractStep;
use crate::errors::PipelineError;

/// Outcome of a single extract step.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub step: String,
    pub source: String,
    pub rows: usize,
    pub status: FetchStatus,
}

/// Tables keyed by extract step name, plus how each fetch went.
#[derive(Debug, Default)]
pub struct Extraction {
    pub tables: BTreeMap<String, Table>,
    pub reports: Vec<SourceReport>,
}

impl Extraction {
    #[must_use]
    pub fn status_of(&self, step: &str) -> Option<&FetchStatus> {
        self.reports
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.status != FetchStatus::Success)
    }
}

/// Resolve every step's adapter up front so a missing source fails before
/// any fetch is issued.
///
/// # Errors
///
/// Returns `ConfigMissing` naming the first unregistered source.
pub fn resolve_sources(
    registry: &SourceRegistry,
    steps: &[ExtractStep],
) -> Result<Vec<Arc<dyn SourceAdapter>>, PipelineError> {
    steps
        .iter()
        .map(|step| {
            registry
                .get(&step.source)
                .ok_or_else(|| PipelineError::missing("source", &step.source))
        })
        .collect()
}

/// Fetch every step once. Source failures are recorded, never raised.
///
/// # Errors
///
/// Returns `ConfigMissing` for an unregistered source and `InvalidPlan` for a
/// step whose shape does not fit its source kind.
pub async fn extract(
    registry: &SourceRegistry,
    steps: &[ExtractStep],
    window: Option<DeltaWindow>,
) -> Result<Extraction, PipelineError> {
    let adapters = resolve_sources(registry, steps)?;
    let mut extraction = Extraction::default();

    for (step, adapter) in steps.iter().zip(adapters) {
        let selector = selector_for(step, adapter.kind(), window)?;
        let started = Instant::now();
        let result = adapter.fetch(&selector).await;

        let mut table = result.value.with_name(step.name.as_str());
        if table.columns().is_empty() && !step.columns.is_empty() {
            table = Table::new(step.name.as_str(), step.columns.clone());
        }
        for (from, to) in &step.rename {
            table.rename_column(from, to);
        }

        match result.status.error() {
            None => tracing::info!(
                step = %step.name,
                source = %step.source,
                rows = table.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "extracted"
            ),
            Some(e) => tracing::warn!(
                step = %step.name,
                source = %step.source,
                status = result.status.label(),
                category = %e.category,
                error = %e.message,
                rows = table.len(),
                "source degraded"
            ),
        }

        extraction.reports.push(SourceReport {
            step: step.name.clone(),
            source: step.source.clone(),
            rows: table.len(),
            status: result.status,
        });
        extraction.tables.insert(step.name.clone(), table);
    }

    Ok(extraction)
}

fn selector_for(
    step: &ExtractStep,
    kind: SourceKind,
    window: Option<DeltaWindow>,
) -> Result<Selector, PipelineError> {
    match kind {
        SourceKind::Postgres => {
            let table = step.table.clone().ok_or_else(|| {
                PipelineError::InvalidPlan(format!(
                    "extract '{}' reads postgres source '{}' without a table",
                    step.name, step.source
                ))
            })?;
            let filter = match (&step.window_column, window) {
                (Some(column), Some(window)) => Some(WindowFilter {
                    column: column.clone(),
                    window,
                }),
                (Some(_), None) => {
                    return Err(PipelineError::InvalidPlan(format!(
                        "extract '{}' filters on a window the pipeline does not define",
                        step.name
                    )))
                }
                (None, _) => None,
            };
            Ok(Selector::Table { table, filter })
        }
        SourceKind::Sheet => Ok(Selector::Worksheet),
        SourceKind::Api => Err(PipelineError::InvalidPlan(format!(
            "extract '{}' reads api source '{}'; api sources serve lookups only",
            step.name, step.source
        ))),
    }
}
