use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::lifecycle::PollingConfig;
use crate::transport::TransportConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub sftp: Option<SftpConfig>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Vendor API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API root, e.g. "https://api.galatea.bio/api/v1"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 300, uploads included)
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.galatea.bio/api/v1".to_string()
}

fn default_api_timeout() -> u64 {
    300
}

/// Account credentials. Either may be supplied on the command line instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// SFTP bulk-transfer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Private key used instead of (or before) the password
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
    /// Remote folder uploads land in (created if missing)
    #[serde(default = "default_sftp_folder")]
    pub folder: String,
    /// Connect/read timeout in seconds (default: 60)
    #[serde(default = "default_sftp_timeout")]
    pub timeout_secs: u64,
}

fn default_sftp_port() -> u16 {
    22
}

fn default_sftp_folder() -> String {
    "octopod_cli_uploads".to_string()
}

fn default_sftp_timeout() -> u64 {
    60
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub api: ApiConfig,
    pub credentials: SanitizedCredentialsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sftp: Option<SanitizedSftpConfig>,
    pub transport: TransportConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCredentialsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password_configured: bool,
}

/// Sanitized SFTP config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSftpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<PathBuf>,
    pub folder: String,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            api: config.api.clone(),
            credentials: SanitizedCredentialsConfig {
                username: config.credentials.username.clone(),
                password_configured: config
                    .credentials
                    .password
                    .as_ref()
                    .is_some_and(|p| !p.is_empty()),
            },
            sftp: config.sftp.as_ref().map(|s| SanitizedSftpConfig {
                host: s.host.clone(),
                port: s.port,
                user: s.user.clone(),
                password_configured: s.password.as_ref().is_some_and(|p| !p.is_empty()),
                keyfile: s.keyfile.clone(),
                folder: s.folder.clone(),
                timeout_secs: s.timeout_secs,
            }),
            transport: config.transport.clone(),
            polling: config.polling.clone(),
        }
    }
}
