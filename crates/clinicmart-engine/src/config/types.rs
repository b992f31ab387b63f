//! Serde types for the clinicmart YAML config.

use std::collections::BTreeMap;

use clinicmart_sources::SourceConfig;
use clinicmart_types::RefreshPolicy;
use clinicmart_warehouse::WarehouseConfig;
use indexmap::IndexMap;
use serde::Deserialize;

/// Top-level config file: shared sources, one warehouse, any number of pipelines.
#[derive(Debug, Clone, Deserialize)]
pub struct ClinicmartConfig {
    pub version: String,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl ClinicmartConfig {
    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    /// Absent for full-snapshot pipelines.
    #[serde(default)]
    pub window: Option<WindowConfig>,
    pub extract: Vec<ExtractStep>,
    pub join: JoinPlan,
    /// Post-join column renames, applied in order. Absent columns are skipped.
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    /// Coerce every column whose name contains `date` or `created` to a timestamp.
    #[serde(default = "default_true")]
    pub coerce_dates: bool,
    #[serde(default)]
    pub derive: Vec<DeriveRule>,
    #[serde(default)]
    pub enrich: Option<EnrichConfig>,
    #[serde(default)]
    pub dimension: Option<DimensionConfig>,
    pub load: LoadConfig,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Offset from UTC of the calendar "today" is taken from.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

/// One source read. `table` is required for relational sources; sheets take none.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractStep {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Filter the read to the run's window on this column.
    #[serde(default)]
    pub window_column: Option<String>,
    /// Column aliases applied right after the fetch.
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    /// Schema to assume when the source returns no columns.
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinPlan {
    pub base: String,
    #[serde(default)]
    pub steps: Vec<JoinStep>,
}

/// Left-outer join of the running result with `table`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinStep {
    pub table: String,
    pub left: String,
    /// Defaults to `left`.
    #[serde(default)]
    pub right: Option<String>,
}

impl JoinStep {
    #[must_use]
    pub fn right_key(&self) -> &str {
        self.right.as_deref().unwrap_or(&self.left)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeriveRule {
    /// `target = then` when `source` equals `equals`, else `otherwise`.
    Label {
        target: String,
        source: String,
        equals: String,
        then: String,
        otherwise: String,
    },
    /// `target = left * right`.
    Product {
        target: String,
        left: String,
        right: String,
    },
}

impl DeriveRule {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Label { target, .. } | Self::Product { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub lookups: Vec<LookupRule>,
}

/// Per-key API lookup joined back onto the fact table.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupRule {
    /// An `api` source.
    pub source: String,
    /// Fact column holding the lookup key.
    pub key: String,
    /// Query parameter the key is sent as.
    pub param: String,
    /// Response field → fact column.
    pub fields: IndexMap<String, String>,
    /// Fact column values for rows whose key is null. Such rows are never looked up.
    #[serde(default)]
    pub on_null_key: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionConfig {
    /// Extract step holding the dimension rows.
    pub table: String,
    #[serde(default = "default_sku_column")]
    pub sku_column: String,
    #[serde(default = "default_normalized_column")]
    pub normalized_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    pub fact: LoadTarget,
    #[serde(default)]
    pub dimension: Option<LoadTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadTarget {
    pub table: String,
    pub policy: RefreshPolicy,
    /// Column matched against the window by `replace_window`.
    #[serde(default)]
    pub window_column: Option<String>,
    /// Final column list; empty writes every column.
    #[serde(default)]
    pub columns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_run_timeout_secs() -> u64 {
    1800
}

fn default_lookback_days() -> u32 {
    3
}

fn default_max_concurrency() -> usize {
    8
}

fn default_sku_column() -> String {
    "sku".to_string()
}

fn default_normalized_column() -> String {
    "sku_normalized".to_string()
}
