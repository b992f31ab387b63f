//! Spreadsheet adapter reading one worksheet through the Google Sheets
//! values endpoint.
//!
//! The first row is the header. Every following row becomes a record with one
//! field per header; cells past the end of a short row read as empty strings
//! and numeric-looking text becomes a number.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use clinicmart_types::{FetchResult, Record, SourceError, Table, Value};
use reqwest::Url;
use serde::Deserialize;

use crate::adapter::{Selector, SourceAdapter, SourceKind};
use crate::config::SheetSource;
use crate::http::{ensure_ok, transport_error};

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetAdapter {
    name: String,
    config: SheetSource,
    client: reqwest::Client,
}

impl SheetAdapter {
    #[must_use]
    pub fn new(name: &str, config: SheetSource) -> Self {
        Self {
            name: name.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn values_url(&self) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SourceError::query(format!("invalid sheets base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| SourceError::query("sheets base_url cannot carry a path"))?
            .pop_if_empty()
            .extend([
                self.config.spreadsheet_id.as_str(),
                "values",
                self.config.worksheet.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        Ok(url)
    }

    async fn read_values(&self) -> Result<ValueRange, SourceError> {
        let response = self
            .client
            .get(self.values_url()?)
            .bearer_auth(&self.config.access_token)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        ensure_ok(response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(format!("invalid values response: {e}")))
    }
}

/// Build a table from worksheet rows. Returns the duplicate or blank header
/// names that were ignored.
pub(crate) fn table_from_values(
    name: &str,
    values: &[Vec<serde_json::Value>],
) -> (Table, Vec<String>) {
    let Some((header, body)) = values.split_first() else {
        return (Table::empty(name), Vec::new());
    };

    let mut seen = HashSet::new();
    let mut ignored = Vec::new();
    let headers: Vec<Option<String>> = header
        .iter()
        .map(|cell| {
            let label = cell_text(cell);
            if label.is_empty() || !seen.insert(label.clone()) {
                ignored.push(label);
                None
            } else {
                Some(label)
            }
        })
        .collect();

    let mut table = Table::new(name, headers.iter().flatten().cloned().collect());
    for row in body {
        let record: Record = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| h.as_ref().map(|h| (idx, h)))
            .map(|(idx, h)| (h.clone(), row.get(idx).map_or_else(empty_cell, cell_value)))
            .collect();
        table.push(record);
    }
    (table, ignored)
}

fn empty_cell() -> Value {
    Value::Text(String::new())
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &serde_json::Value) -> Value {
    match cell {
        serde_json::Value::String(s) => numericise(s),
        serde_json::Value::Null => empty_cell(),
        other => Value::from_json(other),
    }
}

/// Numeric-looking text becomes a number, anything else stays text.
fn numericise(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::Text(text.to_string()),
    }
}

#[async_trait]
impl SourceAdapter for SheetAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Sheet
    }

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table> {
        if *selector != Selector::Worksheet {
            return FetchResult::failed(
                Table::empty(self.name.as_str()),
                selector.mismatch(self.kind()),
            );
        }
        match self.read_values().await {
            Ok(range) => {
                let (table, ignored) = table_from_values(&self.name, &range.values);
                tracing::info!(
                    source = %self.name,
                    worksheet = %self.config.worksheet,
                    rows = table.len(),
                    "worksheet read"
                );
                if ignored.is_empty() {
                    FetchResult::success(table)
                } else {
                    FetchResult::degraded(
                        table,
                        SourceError::decode(format!(
                            "ignored blank or duplicate headers: {ignored:?}"
                        )),
                    )
                }
            }
            Err(e) => FetchResult::failed(Table::empty(self.name.as_str()), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: serde_json::Value) -> Vec<Vec<serde_json::Value>> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn short_rows_pad_with_empty_strings() {
        let values = rows(json!([
            ["adjustment_id", "invoice_id", "note"],
            [1, "INV-9", "late fee"],
            [2, "INV-10"]
        ]));
        let (table, ignored) = table_from_values("manual_adjustments", &values);
        assert!(ignored.is_empty());
        assert_eq!(table.columns(), ["adjustment_id", "invoice_id", "note"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get("note"), &Value::Text(String::new()));
        assert_eq!(table.rows()[0].get("adjustment_id"), &Value::Int(1));
    }

    #[test]
    fn numeric_text_is_numericised() {
        let values = rows(json!([["amount", "code"], ["12.5", "A-1"], ["7", "0x"]]));
        let (table, _) = table_from_values("s", &values);
        assert_eq!(table.rows()[0].get("amount"), &Value::Float(12.5));
        assert_eq!(table.rows()[1].get("amount"), &Value::Int(7));
        assert_eq!(table.rows()[0].get("code"), &Value::from("A-1"));
        assert_eq!(numericise("inf"), Value::from("inf"));
    }

    #[test]
    fn blank_and_duplicate_headers_are_ignored() {
        let values = rows(json!([["a", "", "a", "b"], [1, 2, 3, 4]]));
        let (table, ignored) = table_from_values("s", &values);
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(ignored, vec![String::new(), "a".to_string()]);
        assert_eq!(table.rows()[0].get("a"), &Value::Int(1));
        assert_eq!(table.rows()[0].get("b"), &Value::Int(4));
    }

    #[test]
    fn empty_sheet_gives_empty_table() {
        let (table, ignored) = table_from_values("s", &[]);
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
        assert!(ignored.is_empty());
    }

    #[test]
    fn values_url_encodes_worksheet() {
        let adapter = SheetAdapter::new(
            "manual",
            SheetSource {
                spreadsheet_id: "abc123".to_string(),
                worksheet: "Manual Adjustments".to_string(),
                access_token: "t".to_string(),
                base_url: "https://sheets.example/v4/spreadsheets".to_string(),
                timeout_secs: 5,
            },
        );
        let url = adapter.values_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example/v4/spreadsheets/abc123/values/Manual%20Adjustments?valueRenderOption=UNFORMATTED_VALUE"
        );
    }
}
