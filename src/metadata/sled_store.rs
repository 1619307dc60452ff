use super::{MetadataStore, UploadRecord};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Upload metadata in a Sled embedded database
#[derive(Clone)]
pub struct SledMetadataStore {
    db: Arc<Db>,
    uploads_tree: sled::Tree,
}

impl SledMetadataStore {
    /// Open (or create) the store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            AppError::Metadata(format!("Failed to open Sled database: {}", e))
        })?;

        let uploads_tree = db.open_tree("uploads").map_err(|e| {
            AppError::Metadata(format!("Failed to open uploads tree: {}", e))
        })?;

        tracing::info!("Initialized Sled metadata store at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            uploads_tree,
        })
    }

    /// Insert or replace an upload record, keyed by file id
    pub fn record_upload(&self, record: &UploadRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.uploads_tree
            .insert(record.file_id.as_bytes(), bytes)
            .map_err(|e| AppError::Metadata(format!("Failed to store upload record: {}", e)))?;
        Ok(())
    }

    pub fn get_upload(&self, file_id: &str) -> Result<Option<UploadRecord>> {
        let bytes = self
            .uploads_tree
            .get(file_id.as_bytes())
            .map_err(|e| AppError::Metadata(format!("Failed to read upload record: {}", e)))?;

        bytes
            .map(|bytes| serde_json::from_slice(&bytes).map_err(AppError::from))
            .transpose()
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| AppError::Metadata(format!("Failed to flush Sled database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SledMetadataStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .size_on_disk()
            .map(|_| ())
            .map_err(|e| AppError::Metadata(format!("Sled database unusable: {}", e)))
    }

    async fn count_uploads(&self) -> Result<u64> {
        Ok(self.uploads_tree.len() as u64)
    }
}
