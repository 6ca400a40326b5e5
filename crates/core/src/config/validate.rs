use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - API base URL is an http(s) URL
/// - Transport threshold and attempt counts are non-zero
/// - Poll interval and read attempts are non-zero
/// - SFTP section, when present, names a host and a user
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.api.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "api.base_url must be an http(s) URL, got {:?}",
            config.api.base_url
        )));
    }

    if config.api.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "api.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.transport.size_threshold_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "transport.size_threshold_bytes cannot be 0".to_string(),
        ));
    }

    if config.transport.max_upload_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "transport.max_upload_attempts must be at least 1".to_string(),
        ));
    }

    if config.polling.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "polling.poll_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.polling.max_read_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "polling.max_read_attempts must be at least 1".to_string(),
        ));
    }

    if let Some(sftp) = &config.sftp {
        if sftp.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sftp.host cannot be empty".to_string(),
            ));
        }
        if sftp.user.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sftp.user cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SftpConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_bad_base_url_fails() {
        let mut config = Config::default();
        config.api.base_url = "ftp://api.example.test".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_threshold_fails() {
        let mut config = Config::default();
        config.transport.size_threshold_bytes = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("size_threshold_bytes"));
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let mut config = Config::default();
        config.polling.poll_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_attempts_fail() {
        let mut config = Config::default();
        config.transport.max_upload_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.polling.max_read_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_blank_sftp_host_fails() {
        let mut config = Config::default();
        config.sftp = Some(SftpConfig {
            host: "  ".to_string(),
            port: 22,
            user: "u".to_string(),
            password: None,
            keyfile: None,
            folder: "uploads".to_string(),
            timeout_secs: 60,
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sftp.host"));
    }
}
