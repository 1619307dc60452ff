//! Upload metadata store
//!
//! Upload bookkeeping is written by the ingestion side; this service only
//! reads it, for the `files_uploaded` statistic and health reporting.

mod memory;
mod sled_store;

pub use memory::InMemoryMetadataStore;
pub use sled_store::SledMetadataStore;

use crate::config::{MetadataBackend, MetadataConfig};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One uploaded log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub file_id: String,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub record_count: u64,
    pub upload_timestamp: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub processing_status: String,
}

fn default_status() -> String {
    "uploaded".to_string()
}

/// Read access to upload metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Backend name used in logs and health reports
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    /// Total number of upload records
    async fn count_uploads(&self) -> Result<u64>;
}

/// Create the metadata store based on configuration
pub fn create_metadata_store(config: &MetadataConfig) -> Result<Arc<dyn MetadataStore>> {
    match config.backend {
        MetadataBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled metadata store");

            Ok(Arc::new(SledMetadataStore::new(path)?))
        }

        MetadataBackend::Memory => {
            tracing::info!("Initializing in-memory metadata store");
            Ok(Arc::new(InMemoryMetadataStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = MetadataConfig {
            backend: MetadataBackend::Sled,
            path: Some(temp_dir.path().to_path_buf()),
        };

        let store = create_metadata_store(&config).unwrap();
        assert_eq!(store.count_uploads().await.unwrap(), 0);
        assert!(store.ping().await.is_ok());
    }

    #[test]
    fn test_sled_requires_path() {
        let config = MetadataConfig {
            backend: MetadataBackend::Sled,
            path: None,
        };
        assert!(create_metadata_store(&config).is_err());
    }

    #[test]
    fn test_upload_record_defaults() {
        let record: UploadRecord = serde_json::from_value(serde_json::json!({
            "file_id": "f1",
            "original_filename": "app.csv",
            "file_type": "csv",
            "file_size": 2048,
            "upload_timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.processing_status, "uploaded");
        assert_eq!(record.record_count, 0);
    }
}
