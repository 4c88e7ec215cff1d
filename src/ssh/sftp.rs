//! File copy over SFTP
//!
//! Implements the relay's [`FileCopier`] on top of the persistent SSH
//! connection. Each copy opens its own SFTP session and closes it when done.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::connection::SshConnectionManager;
use super::sanitize::{octal_mode, validate_remote_path};
use crate::error::{RelayError, Result};
use crate::relay::{CopyOutcome, FileCopier};

/// Reject files above the configured size limit
fn check_size(size: u64, limit: u64, what: &str) -> Result<()> {
    if size > limit {
        let size_mb = size as f64 / (1024.0 * 1024.0);
        let limit_mb = limit as f64 / (1024.0 * 1024.0);
        return Err(RelayError::invalid_params(format!(
            "{} too large ({:.1}MB). Maximum allowed size is {:.1}MB.",
            what, size_mb, limit_mb
        )));
    }
    Ok(())
}

/// Bytes per second, zero for instantaneous copies
fn transfer_speed(bytes: u64, started: Instant) -> f64 {
    let secs = started.elapsed().as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

impl SshConnectionManager {
    async fn put_with_session(
        &self,
        sftp: &SftpSession,
        local_path: &Path,
        remote_path: &str,
        mode: Option<u32>,
        overwrite: bool,
    ) -> Result<u64> {
        let exists = sftp
            .try_exists(remote_path)
            .await
            .map_err(|e| RelayError::sftp(format!("Failed to stat {}: {}", remote_path, e)))?;

        if exists {
            if !overwrite {
                return Err(RelayError::sftp(format!(
                    "Remote file already exists: {}. Use overwrite=true to force overwrite.",
                    remote_path
                )));
            }
            if let Err(e) = sftp.remove_file(remote_path).await {
                warn!("Failed to remove existing file {}: {}", remote_path, e);
            } else {
                info!("Removed existing file: {}", remote_path);
            }
        }

        let mut source = tokio::fs::File::open(local_path).await?;
        let mut dest = sftp
            .create(remote_path)
            .await
            .map_err(|e| RelayError::sftp(format!("Failed to create {}: {}", remote_path, e)))?;

        let bytes = tokio::io::copy(&mut source, &mut dest).await?;
        dest.shutdown().await?;

        if let Some(mode) = mode {
            let mut attrs = FileAttributes::empty();
            attrs.permissions = Some(mode);
            match sftp.set_metadata(remote_path, attrs).await {
                Ok(()) => info!("Set file permissions to {:o} on {}", mode, remote_path),
                Err(e) => warn!("Failed to set permissions on {}: {}", remote_path, e),
            }
        }

        Ok(bytes)
    }

    async fn get_with_session(
        &self,
        sftp: &SftpSession,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<u64> {
        let metadata = sftp.metadata(remote_path).await.map_err(|_| {
            RelayError::sftp(format!(
                "Remote file does not exist or is not accessible: {}",
                remote_path
            ))
        })?;
        check_size(
            metadata.size.unwrap_or(0),
            self.config().max_file_size,
            "Remote file",
        )?;

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut source = sftp
            .open(remote_path)
            .await
            .map_err(|e| RelayError::sftp(format!("Failed to open {}: {}", remote_path, e)))?;
        // Truncate in place: the path may be a temp file we already own
        let mut dest = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(local_path)
            .await?;

        let bytes = tokio::io::copy(&mut source, &mut dest).await?;
        dest.flush().await?;

        Ok(bytes)
    }
}

#[async_trait]
impl FileCopier for SshConnectionManager {
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        permissions: Option<u32>,
        overwrite: bool,
    ) -> Result<CopyOutcome> {
        validate_remote_path(remote_path)?;
        let mode = permissions.map(octal_mode).transpose()?;

        let metadata = tokio::fs::metadata(local_path).await.map_err(|_| {
            RelayError::invalid_params(format!(
                "Local file does not exist: {}",
                local_path.display()
            ))
        })?;
        check_size(metadata.len(), self.config().max_file_size, "File")?;

        info!("Starting upload: {} -> {}", local_path.display(), remote_path);
        let started = Instant::now();

        let sftp = self.sftp_session().await?;
        let result = self
            .put_with_session(&sftp, local_path, remote_path, mode, overwrite)
            .await;
        if let Err(e) = sftp.close().await {
            debug!("Error closing SFTP session: {}", e);
        }
        let bytes = result?;

        info!(
            "Upload completed: {} bytes ({:.0} bytes/s)",
            bytes,
            transfer_speed(bytes, started)
        );

        Ok(CopyOutcome {
            bytes,
            message: format!(
                "Successfully uploaded {} to {}",
                local_path.display(),
                remote_path
            ),
        })
    }

    async fn get(
        &self,
        remote_path: &str,
        local_path: &Path,
        overwrite: bool,
    ) -> Result<CopyOutcome> {
        validate_remote_path(remote_path)?;

        if !overwrite && tokio::fs::try_exists(local_path).await? {
            return Err(RelayError::invalid_params(format!(
                "Local file already exists: {}. Use overwrite=true to force overwrite.",
                local_path.display()
            )));
        }

        info!("Starting download: {} -> {}", remote_path, local_path.display());
        let started = Instant::now();

        let sftp = self.sftp_session().await?;
        let result = self.get_with_session(&sftp, remote_path, local_path).await;
        if let Err(e) = sftp.close().await {
            debug!("Error closing SFTP session: {}", e);
        }
        let bytes = result?;

        info!(
            "Download completed: {} bytes ({:.0} bytes/s)",
            bytes,
            transfer_speed(bytes, started)
        );

        Ok(CopyOutcome {
            bytes,
            message: format!(
                "Successfully downloaded {} to {}",
                remote_path,
                local_path.display()
            ),
        })
    }
}
