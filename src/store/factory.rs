use crate::config::{ElasticsearchConfig, StoreBackend};
use crate::error::Result;
use crate::store::{ElasticsearchStore, InMemoryLogStore, LogStore};
use std::sync::Arc;

/// Create the document store client based on configuration
pub fn create_store(config: &ElasticsearchConfig) -> Result<Arc<dyn LogStore>> {
    match config.backend {
        StoreBackend::Elasticsearch => {
            tracing::info!(
                url = %config.url,
                index_pattern = %config.index_pattern,
                connect_timeout_ms = config.connect_timeout_ms,
                request_timeout_ms = config.request_timeout_ms,
                "Initializing Elasticsearch store"
            );
            Ok(Arc::new(ElasticsearchStore::new(config)?))
        }

        StoreBackend::Memory => {
            tracing::warn!("Using in-memory log store; it starts empty and is not persisted");
            Ok(Arc::new(InMemoryLogStore::new()))
        }
    }
}
