//! Types for the order lifecycle.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiError, Order, OrderStatus};
use crate::error::ErrorKind;

/// Where an order is in its lifecycle, from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Submitting,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// The local wait budget ran out. The remote order was left alone.
    TimedOut,
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Submitting => "submitting",
            LifecycleState::Pending => "pending",
            LifecycleState::Processing => "processing",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
            LifecycleState::Cancelled => "cancelled",
            LifecycleState::TimedOut => "timed_out",
            LifecycleState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            LifecycleState::Submitting | LifecycleState::Pending | LifecycleState::Processing
        )
    }
}

impl From<OrderStatus> for LifecycleState {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => LifecycleState::Pending,
            OrderStatus::Processing => LifecycleState::Processing,
            OrderStatus::Completed => LifecycleState::Completed,
            OrderStatus::Failed => LifecycleState::Failed,
            OrderStatus::Cancelled => LifecycleState::Cancelled,
            OrderStatus::Unknown => LifecycleState::Error,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a poll loop over an order ended.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Last observed order.
    pub order: Order,
    /// One of `Completed`, `Failed`, `Cancelled`, `TimedOut`.
    pub state: LifecycleState,
    pub reads: u32,
    pub elapsed: Duration,
}

/// A downloaded result, ready to be written.
#[derive(Debug, Clone)]
pub struct ResultArtifact {
    pub result_type: String,
    pub content: Vec<u8>,
    /// Bare file name, never containing a path separator.
    pub filename: String,
}

/// Errors that can occur while driving an order.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("order submission for file {file_id} rejected: {source}")]
    Submit {
        file_id: String,
        #[source]
        source: ApiError,
    },

    #[error("reading order {order_id} failed after {attempts} attempt(s): {source}")]
    OrderRead {
        order_id: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("reading file {file_id} failed after {attempts} attempt(s): {source}")]
    FileRead {
        file_id: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("order {order_id} reported unrecognised status {raw_status:?}")]
    UnknownStatus { order_id: String, raw_status: String },

    #[error("order {order_id} is {status}, results are only available once completed")]
    NotCompleted { order_id: String, status: OrderStatus },

    #[error("order {order_id} completed without any result types")]
    NoResultTypes { order_id: String },

    #[error("order {order_id} does not offer result type {result_type:?} (available: {})", available.join(", "))]
    ResultTypeNotOffered {
        order_id: String,
        result_type: String,
        available: Vec<String>,
    },

    #[error("downloading {result_type} of order {order_id} failed: {source}")]
    Download {
        order_id: String,
        result_type: String,
        #[source]
        source: ApiError,
    },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Submit { source, .. }
            | LifecycleError::Download { source, .. } => source.kind(),
            LifecycleError::OrderRead { source, .. } | LifecycleError::FileRead { source, .. } => {
                // retries already spent
                match source.kind() {
                    ErrorKind::TransientIo => ErrorKind::FatalIo,
                    kind => kind,
                }
            }
            LifecycleError::InvalidPollInterval => ErrorKind::Configuration,
            LifecycleError::UnknownStatus { .. } | LifecycleError::NoResultTypes { .. } => {
                ErrorKind::FatalIo
            }
            LifecycleError::NotCompleted { .. } | LifecycleError::ResultTypeNotOffered { .. } => {
                ErrorKind::Misuse
            }
        }
    }

    /// Order the error is about, when there is one.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            LifecycleError::OrderRead { order_id, .. }
            | LifecycleError::UnknownStatus { order_id, .. }
            | LifecycleError::NotCompleted { order_id, .. }
            | LifecycleError::NoResultTypes { order_id }
            | LifecycleError::ResultTypeNotOffered { order_id, .. }
            | LifecycleError::Download { order_id, .. } => Some(order_id),
            LifecycleError::Submit { .. }
            | LifecycleError::FileRead { .. }
            | LifecycleError::InvalidPollInterval => None,
        }
    }
}
