//! Types for the Octopod vendor API.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::session::{Credentials, Session};

/// Errors returned by the vendor API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// HTTP 401. The access token is missing, invalid or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Login or token renewal was rejected, or a renewed token was rejected again.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Any other 4xx. The request itself is wrong, resending it will not help.
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// 5xx from the vendor.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("local I/O error: {0}")]
    Io(String),
}

impl ApiError {
    /// True for the error class that signals an expired or invalid session token.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// True for network blips worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::ConnectionFailed(_) | ApiError::Timeout | ApiError::Server { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) | ApiError::AuthenticationFailed(_) => {
                ErrorKind::Authentication
            }
            ApiError::ConnectionFailed(_) | ApiError::Timeout | ApiError::Server { .. } => {
                ErrorKind::TransientIo
            }
            ApiError::Forbidden(_)
            | ApiError::NotFound(_)
            | ApiError::Rejected { .. }
            | ApiError::InvalidResponse(_)
            | ApiError::Io(_) => ErrorKind::FatalIo,
        }
    }
}

/// Bearer token handed out by the session manager.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} chars>)", self.0.len())
    }
}

/// Validation state of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidationState {
    /// The remote check has not finished yet.
    Pending,
    /// Checked, acceptable and containing at least one sample.
    Validated,
    /// Rejected by the remote check.
    Failed { reason: String },
}

impl ValidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::Pending => "pending",
            ValidationState::Validated => "validated",
            ValidationState::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ValidationState::Failed { .. })
    }
}

/// A file entry from the remote file index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// File id (uuid string).
    pub id: String,
    /// File name as stored by the vendor.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Whether the remote validation check has run.
    pub check_completed: bool,
    /// Whether the check accepted the file (unknown until the check completes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptable: Option<bool>,
    /// Number of samples detected in the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_of_samples: Option<u64>,
    /// Vendor-provided explanation when the check rejects the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

impl RemoteFile {
    /// Derive the validation state from the raw check fields.
    pub fn validation_state(&self) -> ValidationState {
        if !self.check_completed {
            return ValidationState::Pending;
        }

        let samples = self.amount_of_samples.unwrap_or(0);
        match self.acceptable {
            Some(true) if samples > 0 => ValidationState::Validated,
            Some(true) => ValidationState::Failed {
                reason: self
                    .validation_message
                    .clone()
                    .unwrap_or_else(|| "no samples detected in file".to_string()),
            },
            _ => ValidationState::Failed {
                reason: self
                    .validation_message
                    .clone()
                    .unwrap_or_else(|| "file was marked as not acceptable".to_string()),
            },
        }
    }
}

/// Query against the remote file index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    /// File id or file name.
    pub file: Option<String>,
}

impl FileQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            file: Some(name.into()),
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::by_name(id)
    }
}

/// Status of an order, as a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// A vendor value this client does not recognise.
    Unknown,
}

impl OrderStatus {
    /// Map a vendor status string onto the closed set.
    pub fn from_vendor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "submitted" | "pending" | "queued" | "initializing" => OrderStatus::Pending,
            "running" | "processing" | "model completed" | "making report"
            | "collecting report results" => OrderStatus::Processing,
            "completed" | "reports failed" => OrderStatus::Completed,
            "failed" => OrderStatus::Failed,
            "canceled" | "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Unknown => "unknown",
        }
    }

    /// Terminal statuses end polling.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as last observed on the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub status: OrderStatus,
    /// The vendor's status string, kept for diagnostics.
    pub raw_status: String,
    /// Result types the order can produce, in vendor order.
    pub result_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw bytes of a downloaded result.
#[derive(Debug, Clone)]
pub struct DownloadedResult {
    pub content: Vec<u8>,
    /// File name suggested by the server, if any.
    pub suggested_filename: Option<String>,
}

/// Session acquisition against the vendor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange credentials for a new session.
    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError>;

    /// Renew a session with its refresh token.
    ///
    /// Returns `Ok(None)` when the backend has no refresh mechanism, in which
    /// case the caller falls back to a full login.
    async fn refresh(&self, _session: &Session) -> Result<Option<Session>, ApiError> {
        Ok(None)
    }

    /// Whether `err` means the token is no longer accepted.
    fn is_expired_error(&self, err: &ApiError) -> bool {
        err.is_auth_expired()
    }
}

/// Authenticated operations of the vendor API.
#[async_trait]
pub trait OctopodApi: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Upload file bytes through the API. Returns the new file id.
    async fn upload_direct(
        &self,
        token: &AccessToken,
        content: Vec<u8>,
        file_name: &str,
    ) -> Result<String, ApiError>;

    /// List files matching `query`.
    async fn list_files(
        &self,
        token: &AccessToken,
        query: &FileQuery,
    ) -> Result<Vec<RemoteFile>, ApiError>;

    /// Fetch one file entry, including its validation fields.
    async fn get_file(&self, token: &AccessToken, file_id: &str) -> Result<RemoteFile, ApiError>;

    /// Submit an order for a validated file.
    async fn submit_order(
        &self,
        token: &AccessToken,
        file_id: &str,
        model_name: &str,
        tags: &[String],
    ) -> Result<Order, ApiError>;

    /// Read the current state of an order.
    async fn get_order(&self, token: &AccessToken, order_id: &str) -> Result<Order, ApiError>;

    /// Download one result of a completed order.
    async fn download_result(
        &self,
        token: &AccessToken,
        order_id: &str,
        result_type: &str,
    ) -> Result<DownloadedResult, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_file(check_completed: bool, acceptable: Option<bool>, samples: Option<u64>) -> RemoteFile {
        RemoteFile {
            id: "f-1".to_string(),
            name: "data.vcf".to_string(),
            size_bytes: None,
            created_at: None,
            check_completed,
            acceptable,
            amount_of_samples: samples,
            validation_message: None,
        }
    }

    #[test]
    fn test_order_status_from_vendor() {
        assert_eq!(OrderStatus::from_vendor("Submitted"), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_vendor("Running"), OrderStatus::Processing);
        assert_eq!(OrderStatus::from_vendor("Making report"), OrderStatus::Processing);
        assert_eq!(
            OrderStatus::from_vendor("Collecting report results"),
            OrderStatus::Processing
        );
        assert_eq!(OrderStatus::from_vendor("Completed"), OrderStatus::Completed);
        assert_eq!(OrderStatus::from_vendor("Reports failed"), OrderStatus::Completed);
        assert_eq!(OrderStatus::from_vendor("Failed"), OrderStatus::Failed);
        assert_eq!(OrderStatus::from_vendor("Canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_vendor(" CANCELLED "), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_vendor("Archived"), OrderStatus::Unknown);
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_validation_state_pending_until_checked() {
        assert_eq!(
            remote_file(false, None, None).validation_state(),
            ValidationState::Pending
        );
    }

    #[test]
    fn test_validation_state_validated() {
        assert_eq!(
            remote_file(true, Some(true), Some(3)).validation_state(),
            ValidationState::Validated
        );
    }

    #[test]
    fn test_validation_state_failed_reasons() {
        let no_samples = remote_file(true, Some(true), Some(0)).validation_state();
        assert_eq!(
            no_samples,
            ValidationState::Failed {
                reason: "no samples detected in file".to_string()
            }
        );

        let mut rejected = remote_file(true, Some(false), Some(5));
        rejected.validation_message = Some("unsupported build GRCh36".to_string());
        assert_eq!(
            rejected.validation_state(),
            ValidationState::Failed {
                reason: "unsupported build GRCh36".to_string()
            }
        );
    }

    #[test]
    fn test_api_error_classes() {
        assert!(ApiError::Unauthorized("expired".into()).is_auth_expired());
        assert!(!ApiError::Forbidden("nope".into()).is_auth_expired());

        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Server {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient());
        assert!(!ApiError::Rejected {
            status: 400,
            message: "bad model".into()
        }
        .is_transient());

        assert_eq!(
            ApiError::AuthenticationFailed("x".into()).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(ApiError::Timeout.kind(), ErrorKind::TransientIo);
        assert_eq!(ApiError::NotFound("x".into()).kind(), ErrorKind::FatalIo);
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-jwt");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("secret-jwt"));
        assert_eq!(token.as_str(), "secret-jwt");
    }
}
