//! Pipeline orchestrator: window, extract, join, transform, enrich, load.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clinicmart_sources::SourceRegistry;
use clinicmart_types::FetchStatus;
use clinicmart_warehouse::Warehouse;

use crate::coerce::coerce_temporal_columns;
use crate::config::types::{ClinicmartConfig, PipelineConfig};
use crate::derive::apply_derivations;
use crate::enrich::{enrich, normalize_dimension};
use crate::errors::PipelineError;
use crate::extract::{extract, resolve_sources};
use crate::join::{ambiguous_renames, apply_renames, join};
use crate::load::load_table;
use crate::result::RunReport;
use crate::window::WindowSelector;

/// Run one pipeline under its `run_timeout_secs` deadline.
///
/// # Errors
///
/// Returns a `PipelineError` for configuration problems (before any fetch),
/// load failures, or an expired deadline. Source and lookup failures degrade
/// the run instead of failing it.
pub async fn run_pipeline(
    pipeline: &PipelineConfig,
    registry: &SourceRegistry,
    warehouse: &dyn Warehouse,
    reference_time: DateTime<Utc>,
) -> Result<RunReport, PipelineError> {
    let secs = pipeline.run_timeout_secs;
    match tokio::time::timeout(
        Duration::from_secs(secs),
        execute_pipeline(pipeline, registry, warehouse, reference_time),
    )
    .await
    {
        Ok(result) => {
            if let Err(ref err) = result {
                tracing::error!(pipeline = pipeline.name, error = %err, "Pipeline failed");
            }
            result
        }
        Err(_) => {
            tracing::error!(pipeline = pipeline.name, secs, "Pipeline deadline exceeded");
            Err(PipelineError::Deadline {
                pipeline: pipeline.name.clone(),
                secs,
            })
        }
    }
}

/// Run every pipeline in config order, or only `only`. Stops at the first
/// failed pipeline.
///
/// # Errors
///
/// Returns `ConfigMissing` when `only` names no configured pipeline, or the
/// first pipeline error.
pub async fn run_all(
    config: &ClinicmartConfig,
    registry: &SourceRegistry,
    warehouse: &dyn Warehouse,
    reference_time: DateTime<Utc>,
    only: Option<&str>,
) -> Result<Vec<RunReport>, PipelineError> {
    let selected: Vec<&PipelineConfig> = match only {
        Some(name) => vec![config
            .pipeline(name)
            .ok_or_else(|| PipelineError::missing("pipeline", name))?],
        None => config.pipelines.iter().collect(),
    };

    let mut reports = Vec::with_capacity(selected.len());
    for pipeline in selected {
        reports.push(run_pipeline(pipeline, registry, warehouse, reference_time).await?);
    }
    Ok(reports)
}

async fn execute_pipeline(
    pipeline: &PipelineConfig,
    registry: &SourceRegistry,
    warehouse: &dyn Warehouse,
    reference_time: DateTime<Utc>,
) -> Result<RunReport, PipelineError> {
    let start = Instant::now();
    tracing::info!(pipeline = pipeline.name, "Starting pipeline run");

    // Every reference must resolve before the first fetch.
    resolve_sources(registry, &pipeline.extract)?;
    if let Some(enrich_config) = &pipeline.enrich {
        if let Some(rule) = enrich_config
            .lookups
            .iter()
            .find(|r| !registry.contains(&r.source))
        {
            return Err(PipelineError::missing("source", &rule.source));
        }
    }

    let window = pipeline
        .window
        .as_ref()
        .map(|w| WindowSelector::from_config(w).map(|s| s.window(reference_time)))
        .transpose()?;
    if let Some(w) = window {
        tracing::info!(pipeline = pipeline.name, window = %w, "Selected delta window");
    }

    let mut extraction = extract(registry, &pipeline.extract, window).await?;

    let mut fact = join(&extraction.tables, &pipeline.join)?;
    let nulled_dates = if pipeline.coerce_dates {
        coerce_temporal_columns(&mut fact)
    } else {
        0
    };
    for column in ambiguous_renames(&fact, &pipeline.rename, &pipeline.join) {
        tracing::warn!(
            pipeline = pipeline.name,
            column,
            "rename takes the leftmost table's column; a joined copy was suffixed, rename it on its extract step instead"
        );
    }
    apply_renames(&mut fact, &pipeline.rename);
    apply_derivations(&mut fact, &pipeline.derive);

    let lookups = match &pipeline.enrich {
        Some(enrich_config) => enrich(&mut fact, registry, enrich_config).await?,
        None => Vec::new(),
    };

    let mut dimension_skipped = false;
    let dimension = match &pipeline.dimension {
        Some(dim) => {
            if matches!(extraction.status_of(&dim.table), Some(FetchStatus::Failed(_))) {
                tracing::warn!(
                    pipeline = pipeline.name,
                    table = %dim.table,
                    "dimension source failed, keeping the previous snapshot"
                );
                dimension_skipped = true;
                None
            } else {
                let mut table = extraction
                    .tables
                    .remove(&dim.table)
                    .ok_or_else(|| {
                        PipelineError::InvalidPlan(format!(
                            "dimension '{}' was not extracted",
                            dim.table
                        ))
                    })?;
                normalize_dimension(&mut table, dim);
                Some(table)
            }
        }
        None => None,
    };

    let fact_rows = fact.len();
    let mut loads = vec![load_table(warehouse, &pipeline.load.fact, fact, window).await?];
    if let (Some(rows), Some(target)) = (dimension, &pipeline.load.dimension) {
        loads.push(load_table(warehouse, target, rows, window).await?);
    }

    let report = RunReport {
        pipeline: pipeline.name.clone(),
        window,
        sources: extraction.reports,
        lookups,
        loads,
        fact_rows,
        nulled_dates,
        dimension_skipped,
        duration_secs: start.elapsed().as_secs_f64(),
    };
    tracing::info!(
        pipeline = pipeline.name,
        fact_rows,
        rows_written = report.rows_written(),
        degraded = report.is_degraded(),
        duration_secs = report.duration_secs,
        "Pipeline run complete"
    );
    Ok(report)
}
