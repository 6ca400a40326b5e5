//! Mock bulk transfer for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::transfer::{BulkTransfer, TransferError};

use super::MockOctopodApi;

/// A recorded bulk upload.
#[derive(Debug, Clone)]
pub struct RecordedBulkUpload {
    pub local_path: PathBuf,
    pub remote_name: String,
    pub remote_folder: String,
    pub size_bytes: u64,
}

/// Mock implementation of the BulkTransfer trait.
///
/// When linked to a [`MockOctopodApi`], every upload is indexed there
/// under its remote name, the way the vendor picks up SFTP drops.
#[derive(Debug, Default)]
pub struct MockBulkTransfer {
    uploads: Arc<RwLock<Vec<RecordedBulkUpload>>>,
    errors: Arc<RwLock<VecDeque<TransferError>>>,
    index: Option<Arc<MockOctopodApi>>,
}

impl MockBulkTransfer {
    /// A transfer whose uploads never show up in any file index.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked_to(api: Arc<MockOctopodApi>) -> Self {
        Self {
            index: Some(api),
            ..Self::default()
        }
    }

    pub async fn uploads(&self) -> Vec<RecordedBulkUpload> {
        self.uploads.read().await.clone()
    }

    /// Fail the next upload with `error`.
    pub async fn queue_error(&self, error: TransferError) {
        self.errors.write().await.push_back(error);
    }
}

#[async_trait]
impl BulkTransfer for MockBulkTransfer {
    fn name(&self) -> &str {
        "mock-sftp"
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_name: &str,
        remote_folder: &str,
    ) -> Result<u64, TransferError> {
        if let Some(err) = self.errors.write().await.pop_front() {
            return Err(err);
        }

        let size_bytes = tokio::fs::metadata(local_path).await?.len();
        self.uploads.write().await.push(RecordedBulkUpload {
            local_path: local_path.to_path_buf(),
            remote_name: remote_name.to_string(),
            remote_folder: remote_folder.to_string(),
            size_bytes,
        });

        if let Some(api) = &self.index {
            api.register_upload(remote_name, size_bytes).await;
        }
        Ok(size_bytes)
    }
}
