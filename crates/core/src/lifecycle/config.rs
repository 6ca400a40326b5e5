//! Polling configuration.

use serde::{Deserialize, Serialize};

/// Poll loop settings for orders and file validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status reads (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Wait budget for an order to reach a terminal status (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Wait budget for remote validation of an uploaded file (seconds).
    #[serde(default = "default_timeout")]
    pub validation_timeout_secs: u64,

    /// Attempts per status read before a transient failure ends the loop.
    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,

    /// Linear backoff unit between read attempts (seconds).
    #[serde(default = "default_read_backoff")]
    pub read_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    18_000 // 5 hours
}

fn default_max_read_attempts() -> u32 {
    3
}

fn default_read_backoff() -> u64 {
    2
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            validation_timeout_secs: default_timeout(),
            max_read_attempts: default_max_read_attempts(),
            read_backoff_secs: default_read_backoff(),
        }
    }
}
