//! Types for transport selection.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiError;
use crate::error::ErrorKind;
use crate::transfer::TransferError;

/// Which channel carries the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Multipart upload through the vendor API.
    Direct,
    /// SFTP side channel.
    Bulk,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Direct => "direct",
            TransportKind::Bulk => "bulk",
        }
    }
}

/// How a [`FileReference`] came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrigin {
    Direct,
    Bulk,
    /// An existing remote file was picked; no bytes moved.
    Reused,
}

impl FileOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOrigin::Direct => "direct",
            FileOrigin::Bulk => "bulk",
            FileOrigin::Reused => "reused",
        }
    }
}

impl fmt::Display for FileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TransportKind> for FileOrigin {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Direct => FileOrigin::Direct,
            TransportKind::Bulk => FileOrigin::Bulk,
        }
    }
}

/// A file known to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub file_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub origin: FileOrigin,
}

/// Errors that can occur while selecting a transport and uploading.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("size threshold must be greater than zero")]
    InvalidThreshold,

    #[error("file of {size_bytes} bytes needs the bulk channel, but no SFTP server is configured")]
    BulkNotConfigured { size_bytes: u64 },

    /// The local file is missing or unreadable. Never retried.
    #[error("cannot read {path}: {message}")]
    FileUnreadable { path: String, message: String },

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("bulk transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Transient failures persisted through every attempt.
    #[error("upload of {name} failed after {attempts} attempts: {message}")]
    UploadFailed {
        name: String,
        attempts: u32,
        message: String,
    },

    #[error("{name} did not appear in the file index within {waited_secs}s of the bulk upload")]
    NotIndexed { name: String, waited_secs: u64 },
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::InvalidThreshold | TransportError::BulkNotConfigured { .. } => {
                ErrorKind::Configuration
            }
            TransportError::Api(e) => e.kind(),
            TransportError::Transfer(e) => e.kind(),
            TransportError::FileUnreadable { .. }
            | TransportError::UploadFailed { .. }
            | TransportError::NotIndexed { .. } => ErrorKind::FatalIo,
        }
    }
}
