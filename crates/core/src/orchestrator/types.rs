//! Types for the upload-and-process orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::Order;
use crate::error::ErrorKind;
use crate::lifecycle::{LifecycleError, PollingConfig};
use crate::transport::{FileReference, TransportError};

/// Which results to download once an order completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "result_type", rename_all = "snake_case")]
pub enum ResultSelection {
    /// The first result type the order offers.
    #[default]
    First,
    /// One specific result type.
    Named(String),
    /// Every offered type, skipping the ones that fail to download.
    All,
}

/// One end-to-end run: upload a file, run a model on it, fetch results.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub file_path: PathBuf,
    pub model_name: String,
    pub download_folder: PathBuf,
    /// Reuse a same-name remote file instead of uploading.
    pub check_if_file_exists: bool,
    pub poll_interval: Duration,
    /// Wait budget for the order (validation has its own, from config).
    pub timeout: Duration,
    pub result: ResultSelection,
    /// Tag ids attached to the order.
    pub tags: Vec<String>,
}

impl ProcessRequest {
    /// Request with the default poll interval and timeout.
    pub fn new(
        file_path: impl Into<PathBuf>,
        model_name: impl Into<String>,
        download_folder: impl Into<PathBuf>,
    ) -> Self {
        let polling = PollingConfig::default();
        Self {
            file_path: file_path.into(),
            model_name: model_name.into(),
            download_folder: download_folder.into(),
            check_if_file_exists: false,
            poll_interval: Duration::from_secs(polling.poll_interval_secs),
            timeout: Duration::from_secs(polling.timeout_secs),
            result: ResultSelection::First,
            tags: Vec::new(),
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    pub fn with_result(mut self, result: ResultSelection) -> Self {
        self.result = result;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn reuse_existing(mut self, check_if_file_exists: bool) -> Self {
        self.check_if_file_exists = check_if_file_exists;
        self
    }

    /// The waiting half of this request, for an order that already exists.
    pub fn wait_request(&self, order_id: impl Into<String>) -> WaitRequest {
        WaitRequest {
            order_id: order_id.into(),
            download_folder: self.download_folder.clone(),
            poll_interval: self.poll_interval,
            timeout: self.timeout,
            result: self.result.clone(),
        }
    }
}

/// Wait for an existing order and download its results.
#[derive(Debug, Clone)]
pub struct WaitRequest {
    pub order_id: String,
    pub download_folder: PathBuf,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub result: ResultSelection,
}

/// A completed order and the files written for it.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order: Order,
    /// Written artifacts, in result type order.
    pub written: Vec<PathBuf>,
}

impl OrderOutcome {
    /// Primary result path.
    pub fn path(&self) -> Option<&Path> {
        self.written.first().map(PathBuf::as_path)
    }
}

/// Result of [`Orchestrator::process`](super::Orchestrator::process).
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub file: FileReference,
    pub order: Order,
    pub written: Vec<PathBuf>,
}

impl ProcessOutcome {
    /// Primary result path.
    pub fn path(&self) -> Option<&Path> {
        self.written.first().map(PathBuf::as_path)
    }
}

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid model name {0:?}: use letters, digits, '_', '-' or '.'")]
    InvalidModelName(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("file {file_id} failed validation: {reason}")]
    ValidationFailed { file_id: String, reason: String },

    #[error("file {file_id} was not validated within {waited_secs}s")]
    ValidationTimedOut { file_id: String, waited_secs: u64 },

    #[error("order {order_id} failed (status {status:?})")]
    OrderFailed { order_id: String, status: String },

    #[error("order {order_id} was cancelled (status {status:?})")]
    OrderCancelled { order_id: String, status: String },

    /// The remote order was left running.
    #[error("order {order_id} still {last_status:?} after {waited_secs}s; resume with `octopod wait --order {order_id}`")]
    TimedOut {
        order_id: String,
        last_status: String,
        waited_secs: u64,
    },

    #[error("order {order_id} completed but none of its results could be downloaded")]
    NoResultsWritten { order_id: String },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InvalidModelName(_) => ErrorKind::Configuration,
            OrchestratorError::Transport(e) => e.kind(),
            OrchestratorError::Lifecycle(e) => e.kind(),
            OrchestratorError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            OrchestratorError::ValidationTimedOut { .. } | OrchestratorError::TimedOut { .. } => {
                ErrorKind::Timeout
            }
            OrchestratorError::OrderFailed { .. } => ErrorKind::OrderFailed,
            OrchestratorError::OrderCancelled { .. } => ErrorKind::OrderCancelled,
            OrchestratorError::NoResultsWritten { .. } | OrchestratorError::Write { .. } => {
                ErrorKind::FatalIo
            }
        }
    }
}
