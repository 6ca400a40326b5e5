//! SFTP bulk transfer backed by libssh2.

use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tracing::{debug, info, warn};

use crate::config::SftpConfig;

use super::{BulkTransfer, TransferError};

/// SFTP client. Each upload opens its own SSH connection on the blocking pool.
pub struct SftpTransfer {
    config: SftpConfig,
}

impl SftpTransfer {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// Folder used when callers do not pick one.
    pub fn default_folder(&self) -> &str {
        &self.config.folder
    }
}

/// POSIX path of the uploaded file on the server.
fn remote_path(remote_folder: &str, remote_name: &str) -> String {
    let folder = remote_folder.trim_end_matches('/');
    if folder.is_empty() {
        remote_name.to_string()
    } else {
        format!("{}/{}", folder, remote_name)
    }
}

/// Each ancestor of `remote_folder`, outermost first, ending with the folder.
fn folder_prefixes(remote_folder: &str) -> Vec<String> {
    let absolute = remote_folder.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();

    for segment in remote_folder.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

fn remote_err(e: impl std::fmt::Display) -> TransferError {
    TransferError::Remote(e.to_string())
}

fn connect(config: &SftpConfig) -> Result<Session, TransferError> {
    let addr = format!("{}:{}", config.host, config.port);
    let timeout = Duration::from_secs(config.timeout_secs);

    let tcp = TcpStream::connect(&addr).map_err(|e| TransferError::ConnectionFailed {
        host: addr.clone(),
        message: e.to_string(),
    })?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let mut session = Session::new().map_err(remote_err)?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| TransferError::ConnectionFailed {
            host: addr.clone(),
            message: format!("SSH handshake failed: {}", e),
        })?;

    authenticate(&session, config)?;
    Ok(session)
}

/// Key file first, then password, then the SSH agent.
fn authenticate(session: &Session, config: &SftpConfig) -> Result<(), TransferError> {
    let mut last_error = None;

    if let Some(keyfile) = &config.keyfile {
        match session.userauth_pubkey_file(&config.user, None, keyfile, None) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(user = %config.user, "SFTP key authentication failed: {}", e);
                last_error = Some(e.to_string());
            }
        }
    }

    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        match session.userauth_password(&config.user, password) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    if config.keyfile.is_none() && config.password.is_none() {
        match session.userauth_agent(&config.user) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    if session.authenticated() {
        return Ok(());
    }

    Err(TransferError::AuthenticationFailed {
        user: config.user.clone(),
        message: last_error.unwrap_or_else(|| "no authentication method accepted".to_string()),
    })
}

fn upload_blocking(
    config: &SftpConfig,
    local_path: &Path,
    remote_name: &str,
    remote_folder: &str,
) -> Result<u64, TransferError> {
    let mut local = std::fs::File::open(local_path)?;

    let session = connect(config)?;
    let sftp = session.sftp().map_err(remote_err)?;

    for folder in folder_prefixes(remote_folder) {
        let path = Path::new(&folder);
        if sftp.stat(path).is_err() {
            debug!(folder = %folder, "Creating remote folder");
            sftp.mkdir(path, 0o755).map_err(remote_err)?;
        }
    }

    let target = remote_path(remote_folder, remote_name);
    let mut remote = sftp.create(Path::new(&target)).map_err(remote_err)?;
    let written = io::copy(&mut local, &mut remote).map_err(remote_err)?;
    drop(remote);

    if let Err(e) = session.disconnect(None, "upload complete", None) {
        debug!("SFTP disconnect failed: {}", e);
    }

    Ok(written)
}

#[async_trait]
impl BulkTransfer for SftpTransfer {
    fn name(&self) -> &str {
        "sftp"
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_name: &str,
        remote_folder: &str,
    ) -> Result<u64, TransferError> {
        let config = self.config.clone();
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_name = remote_name.to_string();
        let remote_folder = remote_folder.to_string();

        info!(
            "SFTP uploading => {}@{}:{}",
            config.user,
            config.host,
            remote_path(&remote_folder, &remote_name)
        );

        let written = tokio::task::spawn_blocking(move || {
            upload_blocking(&config, &local_path, &remote_name, &remote_folder)
        })
        .await
        .map_err(|e| TransferError::Internal(e.to_string()))??;

        info!(bytes = written, "SFTP upload complete");
        Ok(written)
    }
}
