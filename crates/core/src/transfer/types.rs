//! Types for bulk file transfer.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during a bulk transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connection to {host} failed: {message}")]
    ConnectionFailed { host: String, message: String },

    #[error("authentication as {user} failed: {message}")]
    AuthenticationFailed { user: String, message: String },

    #[error("remote I/O error: {0}")]
    Remote(String),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer task failed: {0}")]
    Internal(String),
}

impl TransferError {
    /// Network-level failures are retried; credential and local problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::ConnectionFailed { .. } | TransferError::Remote(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::AuthenticationFailed { .. } => ErrorKind::Authentication,
            TransferError::ConnectionFailed { .. } | TransferError::Remote(_) => {
                ErrorKind::TransientIo
            }
            TransferError::Io(_) | TransferError::Internal(_) => ErrorKind::FatalIo,
        }
    }
}

/// Side channel for large payloads.
#[async_trait]
pub trait BulkTransfer: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Copy `local_path` to `remote_folder/remote_name`, creating the folder if needed.
    async fn upload(
        &self,
        local_path: &Path,
        remote_name: &str,
        remote_folder: &str,
    ) -> Result<u64, TransferError>;
}
