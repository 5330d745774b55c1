//! Model catalog collaborator.
//!
//! The catalog answers "where does model X live by default" for
//! registrations that do not carry an explicit endpoint. The gateway only
//! consumes this interface; richer catalogs (service discovery, control
//! plane) live outside this crate.

use std::collections::HashMap;

use crate::config::CatalogConfig;

pub trait ModelCatalog: Send + Sync {
    /// Default endpoint for a model, if the catalog knows one.
    fn endpoint_for(&self, model_id: &str) -> Option<String>;
}

/// Catalog backed by static configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    endpoints: HashMap<String, String>,
}

impl StaticCatalog {
    pub fn new(endpoints: HashMap<String, String>) -> Self {
        Self { endpoints }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.endpoints.clone())
    }
}

impl ModelCatalog for StaticCatalog {
    fn endpoint_for(&self, model_id: &str) -> Option<String> {
        self.endpoints.get(model_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_lookup() {
        let catalog = StaticCatalog::new(HashMap::from([(
            "llama3:8b".to_string(),
            "http://10.0.0.12:8080".to_string(),
        )]));
        assert_eq!(
            catalog.endpoint_for("llama3:8b").as_deref(),
            Some("http://10.0.0.12:8080")
        );
        assert_eq!(catalog.endpoint_for("qwen2.5:7b"), None);
    }
}
