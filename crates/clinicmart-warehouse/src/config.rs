//! Warehouse connection config from the pipeline YAML.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Upper bound on rows per multi-row INSERT statement.
    #[serde(default = "default_insert_chunk_rows")]
    pub insert_chunk_rows: usize,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_insert_chunk_rows() -> usize {
    1000
}
