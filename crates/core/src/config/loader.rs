use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides, e.g. `OCTOPOD_POLLING__TIMEOUT_SECS=600`.
const ENV_PREFIX: &str = "OCTOPOD_";

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
        .ignore(&["CONFIG"])
        .split("__")
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::new()
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[polling]
poll_interval_secs = 15
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.polling.poll_interval_secs, 15);
    }

    #[test]
    fn test_load_config_from_str_invalid_type() {
        let toml = r#"
[transport]
size_threshold_bytes = "big"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/octopod.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[api]
base_url = "http://127.0.0.1:9000/api/v1"

[credentials]
username = "user@example.com"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://127.0.0.1:9000/api/v1");
        assert_eq!(config.credentials.username.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "octopod.toml",
                r#"
[polling]
poll_interval_secs = 60
"#,
            )?;
            jail.set_env("OCTOPOD_POLLING__POLL_INTERVAL_SECS", "5");
            jail.set_env("OCTOPOD_API__TIMEOUT_SECS", "42");

            let config = load_config(Path::new("octopod.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.polling.poll_interval_secs, 5);
            assert_eq!(config.api.timeout_secs, 42);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_env_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OCTOPOD_TRANSPORT__SIZE_THRESHOLD_BYTES", "1024");

            let config = load_config_from_env().map_err(|e| e.to_string())?;
            assert_eq!(config.transport.size_threshold_bytes, 1024);
            assert_eq!(config.api.timeout_secs, 300);
            Ok(())
        });
    }
}
