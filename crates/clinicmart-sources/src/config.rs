//! Source connection descriptors, as they appear under `sources:` in the
//! pipeline YAML.

use serde::Deserialize;

use crate::adapter::SourceKind;

/// One named source. The `kind` tag selects the adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Postgres(PostgresSource),
    Api(ApiSource),
    Sheet(SheetSource),
}

impl SourceConfig {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Postgres(_) => SourceKind::Postgres,
            Self::Api(_) => SourceKind::Api,
            Self::Sheet(_) => SourceKind::Sheet,
        }
    }
}

/// Operational database of one service.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresSource {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Bound on connect plus query, per fetch.
    #[serde(default = "default_pg_timeout")]
    pub timeout_secs: u64,
}

/// Partner HTTP API answering one JSON object per lookup key.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSource {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Row returned in place of the response when a call fails. Validation
    /// requires a value for every field a lookup reads.
    #[serde(default)]
    pub sentinel: serde_json::Map<String, serde_json::Value>,
}

/// A worksheet of a Google spreadsheet.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetSource {
    pub spreadsheet_id: String,
    pub worksheet: String,
    /// OAuth bearer token with read access to the spreadsheet.
    pub access_token: String,
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_pg_timeout() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    10
}

fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com/v4/spreadsheets".to_string()
}
