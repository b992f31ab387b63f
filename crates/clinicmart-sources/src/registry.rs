//! Name → adapter lookup built from the `sources:` config section.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::adapter::SourceAdapter;
use crate::api::ApiAdapter;
use crate::config::SourceConfig;
use crate::postgres::PostgresAdapter;
use crate::sheet::SheetAdapter;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per configured source. Building an adapter does not
    /// contact the source.
    #[must_use]
    pub fn from_configs(configs: &BTreeMap<String, SourceConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in configs {
            let adapter: Arc<dyn SourceAdapter> = match config {
                SourceConfig::Postgres(c) => Arc::new(PostgresAdapter::new(c.clone())),
                SourceConfig::Api(c) => Arc::new(ApiAdapter::new(name, c.clone())),
                SourceConfig::Sheet(c) => Arc::new(SheetAdapter::new(name, c.clone())),
            };
            registry.register(name.clone(), adapter);
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
