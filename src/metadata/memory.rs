use super::{MetadataStore, UploadRecord};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory metadata store (for development and testing)
pub struct InMemoryMetadataStore {
    uploads: RwLock<HashMap<String, UploadRecord>>,
    available: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn record_upload(&self, record: UploadRecord) {
        self.uploads.write().insert(record.file_id.clone(), record);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Metadata("metadata store switched off".to_string()))
        }
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn count_uploads(&self) -> Result<u64> {
        self.check()?;
        Ok(self.uploads.read().len() as u64)
    }
}
