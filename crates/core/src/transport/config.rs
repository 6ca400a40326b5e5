//! Transport configuration.

use serde::{Deserialize, Serialize};

/// Upload transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Files up to this size (inclusive) go through the API.
    /// Larger files go through the bulk channel.
    #[serde(default = "default_size_threshold")]
    pub size_threshold_bytes: u64,

    /// Attempts per upload before a transient failure becomes fatal.
    #[serde(default = "default_max_upload_attempts")]
    pub max_upload_attempts: u32,

    /// Linear backoff unit between upload attempts (seconds).
    #[serde(default = "default_upload_backoff")]
    pub upload_backoff_secs: u64,

    /// How often to look for a bulk-uploaded file in the file index (seconds).
    #[serde(default = "default_reflection_poll")]
    pub reflection_poll_secs: u64,

    /// How long a bulk-uploaded file may take to show up in the index (seconds).
    #[serde(default = "default_reflection_timeout")]
    pub reflection_timeout_secs: u64,
}

fn default_size_threshold() -> u64 {
    50 * 1024 * 1024 // 50 MiB
}

fn default_max_upload_attempts() -> u32 {
    3
}

fn default_upload_backoff() -> u64 {
    5
}

fn default_reflection_poll() -> u64 {
    30
}

fn default_reflection_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            size_threshold_bytes: default_size_threshold(),
            max_upload_attempts: default_max_upload_attempts(),
            upload_backoff_secs: default_upload_backoff(),
            reflection_poll_secs: default_reflection_poll(),
            reflection_timeout_secs: default_reflection_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.size_threshold_bytes, 52_428_800);
        assert_eq!(config.max_upload_attempts, 3);
        assert_eq!(config.upload_backoff_secs, 5);
        assert_eq!(config.reflection_poll_secs, 30);
        assert_eq!(config.reflection_timeout_secs, 300);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            size_threshold_bytes = 1024
            upload_backoff_secs = 1
        "#;
        let config: TransportConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.size_threshold_bytes, 1024);
        assert_eq!(config.upload_backoff_secs, 1);
        assert_eq!(config.max_upload_attempts, 3);
    }
}
