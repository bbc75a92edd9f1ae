//! Catalog - resolves mappings and connectors by id
//!
//! The job orchestrator does not know how mappings and connection settings
//! are stored; it asks a `Catalog` at job start.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::connector::{DestinationWriter, SourceReader};
use crate::domain::MappingSpec;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn mapping(&self, id: &str) -> Option<MappingSpec>;

    async fn source(&self, id: &str) -> Option<Arc<dyn SourceReader>>;

    async fn destination(&self, id: &str) -> Option<Arc<dyn DestinationWriter>>;
}

/// In-memory catalog; entries can be replaced at any time
#[derive(Default)]
pub struct StaticCatalog {
    mappings: RwLock<HashMap<String, MappingSpec>>,
    sources: RwLock<HashMap<String, Arc<dyn SourceReader>>>,
    destinations: RwLock<HashMap<String, Arc<dyn DestinationWriter>>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_mapping(&self, mapping: MappingSpec) {
        debug!(id = %mapping.id, "StaticCatalog::insert_mapping: called");
        self.mappings.write().await.insert(mapping.id.clone(), mapping);
    }

    pub async fn insert_source(&self, id: impl Into<String>, source: Arc<dyn SourceReader>) {
        let id = id.into();
        debug!(%id, "StaticCatalog::insert_source: called");
        self.sources.write().await.insert(id, source);
    }

    pub async fn insert_destination(&self, id: impl Into<String>, destination: Arc<dyn DestinationWriter>) {
        let id = id.into();
        debug!(%id, "StaticCatalog::insert_destination: called");
        self.destinations.write().await.insert(id, destination);
    }

    pub async fn remove_mapping(&self, id: &str) -> Option<MappingSpec> {
        self.mappings.write().await.remove(id)
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn mapping(&self, id: &str) -> Option<MappingSpec> {
        self.mappings.read().await.get(id).cloned()
    }

    async fn source(&self, id: &str) -> Option<Arc<dyn SourceReader>> {
        self.sources.read().await.get(id).cloned()
    }

    async fn destination(&self, id: &str) -> Option<Arc<dyn DestinationWriter>> {
        self.destinations.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemoryDestination, MemorySource};
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup() {
        let catalog = StaticCatalog::new();
        catalog.insert_mapping(MappingSpec::new("m1", "src", "dst")).await;
        catalog
            .insert_source("src", Arc::new(MemorySource::new(json!([]))))
            .await;
        catalog.insert_destination("dst", Arc::new(MemoryDestination::new())).await;

        assert_eq!(catalog.mapping("m1").await.unwrap().source_id, "src");
        assert!(catalog.source("src").await.is_some());
        assert!(catalog.destination("dst").await.is_some());
        assert!(catalog.mapping("m2").await.is_none());
        assert!(catalog.source("dst").await.is_none());
    }

    #[tokio::test]
    async fn test_mapping_is_a_snapshot() {
        let catalog = StaticCatalog::new();
        catalog.insert_mapping(MappingSpec::new("m1", "a", "b")).await;
        let snapshot = catalog.mapping("m1").await.unwrap();

        catalog
            .insert_mapping(MappingSpec::new("m1", "a", "b").with_field("x", "y"))
            .await;
        assert!(snapshot.mapping_config.is_empty());
        assert!(catalog.remove_mapping("m1").await.is_some());
    }
}
