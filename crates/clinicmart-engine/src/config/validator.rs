//! Semantic validation for a parsed clinicmart config.

use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Result};
use clinicmart_sources::{SourceConfig, SourceKind};
use clinicmart_types::RefreshPolicy;

use crate::config::types::{ClinicmartConfig, LoadTarget, PipelineConfig};

/// Validate a parsed config.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing every validation failure found in the config.
pub fn validate_config(config: &ClinicmartConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipelines.is_empty() {
        errors.push("At least one pipeline must be defined".to_string());
    }

    if config.warehouse.insert_chunk_rows == 0 {
        errors.push("warehouse.insert_chunk_rows must be > 0".to_string());
    }

    let mut seen = HashSet::new();
    for pipeline in &config.pipelines {
        if pipeline.name.trim().is_empty() {
            errors.push("Pipeline name must not be empty".to_string());
        } else if !seen.insert(pipeline.name.as_str()) {
            errors.push(format!("Duplicate pipeline name '{}'", pipeline.name));
        }
        validate_pipeline(pipeline, &config.sources, &mut errors);
    }

    if !errors.is_empty() {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}

fn validate_pipeline(
    pipeline: &PipelineConfig,
    sources: &BTreeMap<String, SourceConfig>,
    errors: &mut Vec<String>,
) {
    let context = format!("pipeline '{}'", pipeline.name);

    if pipeline.run_timeout_secs == 0 {
        errors.push(format!("{context}: run_timeout_secs must be > 0"));
    }

    if let Some(window) = pipeline.window {
        if window.lookback_days == 0 {
            errors.push(format!("{context}: window.lookback_days must be >= 1"));
        }
        if !(-23..=23).contains(&window.utc_offset_hours) {
            errors.push(format!(
                "{context}: window.utc_offset_hours {} is outside -23..=23",
                window.utc_offset_hours
            ));
        }
    }

    if pipeline.extract.is_empty() {
        errors.push(format!("{context}: at least one extract step is required"));
    }

    let mut steps = HashSet::new();
    for step in &pipeline.extract {
        let step_context = format!("{context}: extract '{}'", step.name);
        if !steps.insert(step.name.as_str()) {
            errors.push(format!("{context}: duplicate extract step '{}'", step.name));
        }
        match sources.get(&step.source).map(SourceConfig::kind) {
            None => errors.push(format!(
                "{step_context}: source '{}' is not configured",
                step.source
            )),
            Some(SourceKind::Postgres) => {
                if step.table.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    errors.push(format!("{step_context}: postgres sources need a table"));
                }
            }
            Some(SourceKind::Sheet) => {
                if step.table.is_some() {
                    errors.push(format!(
                        "{step_context}: sheet sources read their configured worksheet, drop 'table'"
                    ));
                }
                if step.window_column.is_some() {
                    errors.push(format!(
                        "{step_context}: sheet sources cannot be window filtered"
                    ));
                }
            }
            Some(SourceKind::Api) => errors.push(format!(
                "{step_context}: api sources are used through enrich lookups, not extract"
            )),
        }
        if step.window_column.is_some() && pipeline.window.is_none() {
            errors.push(format!(
                "{step_context}: window_column set but the pipeline has no window"
            ));
        }
    }

    if !steps.contains(pipeline.join.base.as_str()) {
        errors.push(format!(
            "{context}: join base '{}' is not an extract step",
            pipeline.join.base
        ));
    }
    for join in &pipeline.join.steps {
        if !steps.contains(join.table.as_str()) {
            errors.push(format!(
                "{context}: join table '{}' is not an extract step",
                join.table
            ));
        }
        if join.table == pipeline.join.base {
            errors.push(format!(
                "{context}: join base '{}' cannot be joined to itself",
                join.table
            ));
        }
    }

    let mut targets = HashSet::new();
    for rule in &pipeline.derive {
        if !targets.insert(rule.target()) {
            errors.push(format!(
                "{context}: derived column '{}' defined twice",
                rule.target()
            ));
        }
    }

    if let Some(enrich) = &pipeline.enrich {
        if enrich.max_concurrency == 0 {
            errors.push(format!("{context}: enrich.max_concurrency must be >= 1"));
        }
        for lookup in &enrich.lookups {
            match sources.get(&lookup.source) {
                None => errors.push(format!(
                    "{context}: lookup source '{}' is not configured",
                    lookup.source
                )),
                Some(SourceConfig::Api(api)) => {
                    let uncovered: Vec<&str> = lookup
                        .fields
                        .keys()
                        .filter(|field| !api.sentinel.contains_key(field.as_str()))
                        .map(String::as_str)
                        .collect();
                    if !uncovered.is_empty() {
                        errors.push(format!(
                            "{context}: lookup source '{}' has no sentinel value for field(s) {}",
                            lookup.source,
                            uncovered.join(", ")
                        ));
                    }
                }
                Some(other) => errors.push(format!(
                    "{context}: lookup source '{}' is a {} source, expected api",
                    lookup.source,
                    other.kind()
                )),
            }
            if lookup.fields.is_empty() {
                errors.push(format!(
                    "{context}: lookup on '{}' maps no response fields",
                    lookup.source
                ));
            }
        }
    }

    if let Some(dimension) = &pipeline.dimension {
        if !steps.contains(dimension.table.as_str()) {
            errors.push(format!(
                "{context}: dimension table '{}' is not an extract step",
                dimension.table
            ));
        }
        if pipeline.load.dimension.is_none() {
            errors.push(format!(
                "{context}: dimension '{}' has no load.dimension target",
                dimension.table
            ));
        }
    } else if pipeline.load.dimension.is_some() {
        errors.push(format!(
            "{context}: load.dimension set without a dimension section"
        ));
    }

    validate_target(&pipeline.load.fact, pipeline, &context, errors);
    if let Some(target) = &pipeline.load.dimension {
        validate_target(target, pipeline, &context, errors);
    }
    if pipeline
        .load
        .dimension
        .as_ref()
        .is_some_and(|d| d.table == pipeline.load.fact.table)
    {
        errors.push(format!(
            "{context}: fact and dimension load into the same table '{}'",
            pipeline.load.fact.table
        ));
    }
}

fn validate_target(
    target: &LoadTarget,
    pipeline: &PipelineConfig,
    context: &str,
    errors: &mut Vec<String>,
) {
    if target.table.trim().is_empty() {
        errors.push(format!("{context}: load target table must not be empty"));
    }
    if target.policy == RefreshPolicy::ReplaceWindow {
        match &target.window_column {
            None => errors.push(format!(
                "{context}: '{}' uses replace_window but sets no window_column",
                target.table
            )),
            Some(column) => {
                if !target.columns.is_empty() && !target.columns.contains(column) {
                    errors.push(format!(
                        "{context}: window_column '{column}' is not among '{}' load columns",
                        target.table
                    ));
                }
            }
        }
        if pipeline.window.is_none() {
            errors.push(format!(
                "{context}: '{}' uses replace_window but the pipeline has no window",
                target.table
            ));
        }
    }
}
