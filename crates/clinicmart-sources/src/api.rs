//! Partner HTTP API adapter (insurance eligibility, logistics tracking).
//!
//! One call per selector. A successful call yields a one-row table built
//! from the JSON object body; any failure yields the configured sentinel row.

use std::time::Duration;

use async_trait::async_trait;
use clinicmart_types::{FetchResult, Record, SourceError, Table, Value};

use crate::adapter::{Selector, SourceAdapter, SourceKind};
use crate::config::ApiSource;
use crate::http::{ensure_ok, transport_error};

pub struct ApiAdapter {
    name: String,
    config: ApiSource,
    client: reqwest::Client,
}

impl ApiAdapter {
    #[must_use]
    pub fn new(name: &str, config: ApiSource) -> Self {
        Self {
            name: name.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    /// The single row substituted for a failed call.
    #[must_use]
    pub fn sentinel(&self) -> Table {
        let record: Record = self
            .config
            .sentinel
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        Table::from_rows(self.name.as_str(), vec![record])
    }

    async fn call(&self, params: &[(String, String)]) -> Result<Record, SourceError> {
        let response = self
            .client
            .get(&self.config.url)
            .query(params)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let response = ensure_ok(response).await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::decode(format!("invalid JSON body: {e}")))?;
        if !body.is_object() {
            return Err(SourceError::decode(format!(
                "expected a JSON object, got {body}"
            )));
        }
        Ok(Record::from_json_object(&body))
    }
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(&self, selector: &Selector) -> FetchResult<Table> {
        let Selector::Params(params) = selector else {
            return FetchResult::failed(self.sentinel(), selector.mismatch(self.kind()));
        };
        match self.call(params).await {
            Ok(record) => FetchResult::success(Table::from_rows(self.name.as_str(), vec![record])),
            Err(e) => {
                tracing::debug!(source = %self.name, error = %e, "api call failed, using sentinel");
                FetchResult::failed(self.sentinel(), e)
            }
        }
    }
}
