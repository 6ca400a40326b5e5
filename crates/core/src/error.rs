//! Error classification shared by every component.

use serde::Serialize;

/// Coarse error class used by callers to decide whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad thresholds, bad model name, missing configuration. Never retried.
    Configuration,
    /// Credentials rejected, or still rejected after one re-authentication.
    Authentication,
    /// Network blip. Retried a bounded number of times by the component.
    TransientIo,
    /// I/O failure that exhausted its retries, or is not retryable at all.
    FatalIo,
    /// The uploaded file was rejected by remote validation.
    ValidationFailed,
    /// The order reached the `Failed` terminal status.
    OrderFailed,
    /// The order reached the `Cancelled` terminal status.
    OrderCancelled,
    /// The local wait budget ran out. The remote job may still finish.
    Timeout,
    /// The caller asked for something the remote state cannot satisfy.
    Misuse,
}

impl ErrorKind {
    /// Returns the string representation for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::FatalIo => "fatal_io",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::OrderFailed => "order_failed",
            ErrorKind::OrderCancelled => "order_cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Misuse => "misuse",
        }
    }

    /// Whether a later identical attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientIo | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
