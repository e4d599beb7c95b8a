// src/remote/sftp.rs

//! Live SFTP backend
//!
//! Opens an SSH connection with public-key authentication, starts the `sftp`
//! subsystem and exposes the primitives of [`DirectoryBackend`]. The async
//! client runs on a private current-thread runtime; every call blocks until
//! the server answers.

use super::registry::Agency;
use super::{DirectoryBackend, RemoteEntry, StatusCode, StatusError};
use crate::config::{Settings, SftpLogin};
use crate::error::{Error, Result};
use chrono::DateTime;
use russh::client::{self, Handle};
use russh::keys::{self, PrivateKeyWithHashAlg};
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode as SftpStatus;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Host key policy for one connection
struct HostKeyPolicy {
    host: String,
    port: u16,
    strict: bool,
}

impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.strict {
            debug!("Host key checking disabled for {}", self.host);
            return Ok(true);
        }
        match keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("Host key for {}:{} is not in known_hosts", self.host, self.port);
                Ok(false)
            }
            Err(e) => {
                warn!("Host key check for {} failed: {}", self.host, e);
                Ok(false)
            }
        }
    }
}

/// Map an SFTP client error onto the backend status model
fn status_error(err: SftpError, path: &str) -> StatusError {
    match err {
        SftpError::Status(status) => {
            let code = match status.status_code {
                SftpStatus::NoSuchFile => StatusCode::NoSuchFile,
                SftpStatus::PermissionDenied => StatusCode::PermissionDenied,
                SftpStatus::OpUnsupported => StatusCode::OpUnsupported,
                SftpStatus::NoConnection | SftpStatus::ConnectionLost => StatusCode::ConnectionLost,
                _ => StatusCode::Failure,
            };
            StatusError::new(code, format!("{}: {}", path, status.error_message))
        }
        other => StatusError::new(StatusCode::Failure, format!("{}: {}", path, other)),
    }
}

fn io_status(err: std::io::Error, path: &str) -> StatusError {
    StatusError::new(StatusCode::Failure, format!("{}: {}", path, err))
}

/// A connected SFTP session
pub struct SftpBackend {
    runtime: Runtime,
    handle: Handle<HostKeyPolicy>,
    sftp: SftpSession,
}

impl SftpBackend {
    /// Connect and authenticate with the given login
    pub fn connect(login: &SftpLogin) -> Result<Self> {
        let key = keys::load_secret_key(&login.key, None).map_err(|e| {
            Error::ConfigError(format!("cannot load SFTP key {}: {}", login.key.display(), e))
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (handle, sftp) = runtime.block_on(open_session(login, key))?;
        info!("Connected to {}@{}:{}", login.user, login.host, login.port);
        Ok(Self {
            runtime,
            handle,
            sftp,
        })
    }

    async fn write_all(&self, path: &str, data: &[u8]) -> std::result::Result<(), StatusError> {
        let mut file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| status_error(e, path))?;
        file.write_all(data).await.map_err(|e| io_status(e, path))?;
        file.shutdown().await.map_err(|e| io_status(e, path))
    }

    async fn read_all(&self, path: &str) -> std::result::Result<Vec<u8>, StatusError> {
        let mut file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| status_error(e, path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .await
            .map_err(|e| io_status(e, path))?;
        Ok(data)
    }
}

async fn open_session(
    login: &SftpLogin,
    key: keys::PrivateKey,
) -> Result<(Handle<HostKeyPolicy>, SftpSession)> {
    let ssh_err = |e: russh::Error| Error::sftp(format!("{}:{}: {}", login.host, login.port, e));

    let policy = HostKeyPolicy {
        host: login.host.clone(),
        port: login.port,
        strict: login.strict_host_keys,
    };
    let config = Arc::new(client::Config::default());
    let mut handle = client::connect(config, (login.host.as_str(), login.port), policy)
        .await
        .map_err(ssh_err)?;

    let hash = handle.best_supported_rsa_hash().await.map_err(ssh_err)?.flatten();
    let auth = handle
        .authenticate_publickey(&login.user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
        .await
        .map_err(ssh_err)?;
    if !auth.success() {
        return Err(Error::sftp(format!(
            "public key authentication failed for {}@{}",
            login.user, login.host
        )));
    }

    let channel = handle.channel_open_session().await.map_err(ssh_err)?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(ssh_err)?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| Error::sftp(format!("sftp subsystem: {}", e)))?;
    Ok((handle, sftp))
}

impl DirectoryBackend for SftpBackend {
    fn read_dir(&self, path: &str) -> std::result::Result<Vec<RemoteEntry>, StatusError> {
        let entries = self
            .runtime
            .block_on(self.sftp.read_dir(path))
            .map_err(|e| status_error(e, path))?;
        Ok(entries
            .map(|entry| RemoteEntry {
                name: entry.file_name(),
                is_directory: entry.file_type().is_dir(),
                modification_time: entry
                    .metadata()
                    .mtime
                    .and_then(|t| DateTime::from_timestamp(i64::from(t), 0)),
            })
            .collect())
    }

    fn create_dir(&self, path: &str) -> std::result::Result<(), StatusError> {
        self.runtime
            .block_on(self.sftp.create_dir(path))
            .map_err(|e| status_error(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> std::result::Result<(), StatusError> {
        self.runtime
            .block_on(self.sftp.rename(from, to))
            .map_err(|e| status_error(e, from))
    }

    fn remove_file(&self, path: &str) -> std::result::Result<(), StatusError> {
        self.runtime
            .block_on(self.sftp.remove_file(path))
            .map_err(|e| status_error(e, path))
    }

    fn remove_dir(&self, path: &str) -> std::result::Result<(), StatusError> {
        self.runtime
            .block_on(self.sftp.remove_dir(path))
            .map_err(|e| status_error(e, path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), StatusError> {
        self.runtime.block_on(self.write_all(path, data))
    }

    fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, StatusError> {
        self.runtime.block_on(self.read_all(path))
    }
}

impl Drop for SftpBackend {
    fn drop(&mut self) {
        let closed = self.runtime.block_on(self.handle.disconnect(
            russh::Disconnect::ByApplication,
            "",
            "en",
        ));
        if let Err(e) = closed {
            debug!("SFTP disconnect failed: {}", e);
        }
    }
}

/// Open a live directory backend for `agency`
pub fn connect_agency(settings: &Settings, agency: &Agency) -> Result<Box<dyn DirectoryBackend>> {
    let login = settings.sftp_login(agency)?;
    Ok(Box::new(SftpBackend::connect(&login)?))
}
