//! Enrichment engine: batched partner lookups and SKU normalization.
//!
//! Each lookup rule collects the distinct non-null keys of the fact table,
//! fetches them once each with bounded concurrency, and joins the response
//! fields back onto every row carrying that key. Rows with a null key are
//! never sent to the partner.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use clinicmart_sources::{Selector, SourceRegistry};
use clinicmart_types::{FetchStatus, Record, SourceError, Table, Value};
use futures_util::stream::{self, StreamExt};

use crate::config::types::{DimensionConfig, EnrichConfig, LookupRule};
use crate::errors::PipelineError;

/// How one lookup rule went.
#[derive(Debug, Clone)]
pub struct LookupReport {
    pub source: String,
    pub key_column: String,
    pub distinct_keys: usize,
    pub failed_keys: usize,
    pub null_keys: usize,
    pub first_error: Option<SourceError>,
}

impl LookupReport {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.failed_keys > 0
    }
}

/// Trim, upper-case, and hyphenate internal spaces. Idempotent.
#[must_use]
pub fn normalize_sku(sku: Option<&str>) -> Option<String> {
    sku.map(|s| s.trim().to_uppercase().replace(' ', "-"))
}

/// Add the normalized SKU column to the dimension rows.
pub fn normalize_dimension(dimension: &mut Table, config: &DimensionConfig) {
    dimension.fill_column(&config.normalized_column, |row| {
        let sku = match row.get(&config.sku_column) {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        Value::from(normalize_sku(sku.as_deref()))
    });
}

/// Run every lookup rule against the fact table.
///
/// # Errors
///
/// Returns `ConfigMissing` when a rule names an unregistered source. Partner
/// failures are absorbed into the rows as sentinel values.
pub async fn enrich(
    fact: &mut Table,
    registry: &SourceRegistry,
    config: &EnrichConfig,
) -> Result<Vec<LookupReport>, PipelineError> {
    for rule in &config.lookups {
        if !registry.contains(&rule.source) {
            return Err(PipelineError::missing("source", &rule.source));
        }
    }

    let mut reports = Vec::with_capacity(config.lookups.len());
    for rule in &config.lookups {
        reports.push(run_lookup(fact, registry, rule, config.max_concurrency).await?);
    }
    Ok(reports)
}

async fn run_lookup(
    fact: &mut Table,
    registry: &SourceRegistry,
    rule: &LookupRule,
    max_concurrency: usize,
) -> Result<LookupReport, PipelineError> {
    let adapter = registry
        .get(&rule.source)
        .ok_or_else(|| PipelineError::missing("source", &rule.source))?;
    let started = Instant::now();

    let mut keys = BTreeSet::new();
    let mut null_keys = 0;
    for row in fact.rows() {
        match row.get(&rule.key).join_key() {
            Some(key) => {
                keys.insert(key);
            }
            None => null_keys += 1,
        }
    }
    let distinct_keys = keys.len();

    let results: Vec<(String, Record, FetchStatus)> = stream::iter(keys)
        .map(|key| {
            let adapter = adapter.clone();
            let selector = Selector::param(rule.param.as_str(), key.as_str());
            async move {
                let result = adapter.fetch(&selector).await;
                let record = result.value.rows().first().cloned().unwrap_or_default();
                (key, record, result.status)
            }
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;

    let mut failed_keys = 0;
    let mut first_error = None;
    let mut responses: HashMap<String, Record> = HashMap::with_capacity(results.len());
    for (key, record, status) in results {
        if let Some(e) = status.error() {
            failed_keys += 1;
            first_error.get_or_insert_with(|| e.clone());
        }
        responses.insert(key, record);
    }

    let null_values: HashMap<&str, Value> = rule
        .on_null_key
        .iter()
        .map(|(column, v)| (column.as_str(), Value::from_json(v)))
        .collect();
    for column in rule.fields.values().chain(rule.on_null_key.keys()) {
        fact.add_column(column.as_str());
    }

    for row in fact.rows_mut() {
        match row.get(&rule.key).join_key() {
            Some(key) => {
                let response = responses.get(&key);
                for (field, column) in &rule.fields {
                    let value = response.map_or(Value::Null, |r| r.get(field).clone());
                    row.set(column.as_str(), value);
                }
            }
            None => {
                for column in rule.fields.values() {
                    let value = null_values.get(column.as_str()).cloned().unwrap_or_default();
                    row.set(column.as_str(), value);
                }
                for (column, value) in &null_values {
                    row.set(*column, value.clone());
                }
            }
        }
    }

    if let Some(e) = &first_error {
        tracing::warn!(
            source = %rule.source,
            key = %rule.key,
            distinct_keys,
            failed_keys,
            category = %e.category,
            error = %e.message,
            "lookup degraded, sentinel values used"
        );
    } else {
        tracing::info!(
            source = %rule.source,
            key = %rule.key,
            distinct_keys,
            null_keys,
            elapsed_ms = started.elapsed().as_millis(),
            "lookup complete"
        );
    }

    Ok(LookupReport {
        source: rule.source.clone(),
        key_column: rule.key.clone(),
        distinct_keys,
        failed_keys,
        null_keys,
        first_error,
    })
}
