//! Single-step copies between the server's filesystem and the host
//!
//! These stand in for the storage relay when no storage is configured. The
//! "local" side is the filesystem of the machine running this server.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::capability::{Capability, CapabilitySet};
use super::container::{host_download_temp, host_upload_temp, Location};
use super::error::{TransferError, TransferResult};
use super::model::CopyReport;
use super::remote::{FileCopier, RemoteExecutor};
use super::staging::{check_exists, pull_from_container, push_into_container};
use super::temp::HostTempFile;
use crate::error::RelayError;
use crate::ssh::{validate_permissions, validate_remote_path};

/// Size and path problems reported by the copier are the caller's fault
fn copy_error(context: String, err: RelayError) -> TransferError {
    match err {
        RelayError::InvalidParams(_) => TransferError::validation(err),
        other => TransferError::remote(context, other),
    }
}

/// Copies files over SFTP, through a host staging file for containers
pub struct DirectCopier {
    remote: Arc<dyn RemoteExecutor>,
    files: Arc<dyn FileCopier>,
    capabilities: CapabilitySet,
}

impl DirectCopier {
    pub fn new(
        remote: Arc<dyn RemoteExecutor>,
        files: Arc<dyn FileCopier>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            remote,
            files,
            capabilities,
        }
    }

    fn check_paths(
        &self,
        local_path: &str,
        remote_path: &str,
        container_id: Option<u32>,
    ) -> TransferResult<Location> {
        if container_id.is_some() {
            self.capabilities.require(Capability::Containers)?;
        }
        validate_remote_path(remote_path).map_err(TransferError::validation)?;
        validate_remote_path(local_path).map_err(TransferError::validation)?;
        Ok(Location::from(container_id))
    }

    /// Copy `local_path` to `remote_path` on the host or in a container
    pub async fn upload(
        &self,
        local_path: &str,
        remote_path: &str,
        permissions: Option<u32>,
        overwrite: bool,
        container_id: Option<u32>,
    ) -> TransferResult<CopyReport> {
        let location = self.check_paths(local_path, remote_path, container_id)?;
        if let Some(permissions) = permissions {
            validate_permissions(permissions).map_err(TransferError::validation)?;
        }

        let local = Path::new(local_path);
        if !tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Err(TransferError::Validation(format!(
                "Local file not found: {}",
                local_path
            )));
        }

        if !overwrite {
            match check_exists(self.remote.as_ref(), location, remote_path).await {
                Ok(true) => {
                    return Err(TransferError::Conflict {
                        path: remote_path.to_string(),
                        location,
                    })
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "Could not check whether {} exists {}, continuing: {}",
                    remote_path, location, e
                ),
            }
        }

        info!("Copying {} to {} {}", local_path, remote_path, location);
        let bytes = match container_id {
            None => self
                .files
                .put(local, remote_path, permissions, overwrite)
                .await
                .map(|outcome| outcome.bytes)
                .map_err(|e| copy_error(format!("Failed to upload {}", local_path), e))?,
            Some(container_id) => {
                let staging = HostTempFile::new(host_upload_temp(&Uuid::new_v4().to_string()));
                let pushed = push_into_container(
                    self.remote.as_ref(),
                    self.files.as_ref(),
                    local,
                    &staging,
                    container_id,
                    remote_path,
                    permissions,
                )
                .await;
                staging.release(self.remote.as_ref()).await;
                pushed?
            }
        };

        Ok(CopyReport {
            success: true,
            message: format!("File uploaded successfully to {} {}", remote_path, location),
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            container_id,
            permissions,
            bytes_transferred: bytes,
        })
    }

    /// Copy `remote_path` from the host or a container into `local_path`
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &str,
        overwrite: bool,
        container_id: Option<u32>,
    ) -> TransferResult<CopyReport> {
        let location = self.check_paths(local_path, remote_path, container_id)?;

        let local = Path::new(local_path);
        if !overwrite && tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Err(TransferError::LocalConflict(local_path.to_string()));
        }

        if !check_exists(self.remote.as_ref(), location, remote_path).await? {
            return Err(TransferError::SourceNotFound {
                path: remote_path.to_string(),
                location,
            });
        }

        info!("Copying {} {} to {}", remote_path, location, local_path);
        let staging = match container_id {
            Some(container_id) => Some(
                pull_from_container(
                    self.remote.as_ref(),
                    container_id,
                    remote_path,
                    HostTempFile::new(host_download_temp(&Uuid::new_v4().to_string())),
                )
                .await?,
            ),
            None => None,
        };
        let host_source = staging
            .as_ref()
            .map_or(remote_path, HostTempFile::path)
            .to_string();

        let copied = self.files.get(&host_source, local, overwrite).await;
        if let Some(staging) = staging {
            staging.release(self.remote.as_ref()).await;
        }
        let copied =
            copied.map_err(|e| copy_error(format!("Failed to download {}", remote_path), e))?;

        Ok(CopyReport {
            success: true,
            message: format!("File downloaded successfully from {} {}", remote_path, location),
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            container_id,
            permissions: None,
            bytes_transferred: copied.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::FakeHost;

    fn copier(capabilities: CapabilitySet) -> (DirectCopier, Arc<FakeHost>) {
        let host = Arc::new(FakeHost::new());
        let copier = DirectCopier::new(host.clone(), host.clone(), capabilities);
        (copier, host)
    }

    fn local_file(data: &[u8]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), data).unwrap();
        file
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[tokio::test]
    async fn test_upload_to_host_with_mode() {
        let (copier, host) = copier(CapabilitySet::new());
        let local = local_file(b"hello");

        let report = copier
            .upload(path_str(local.path()), "/etc/app.conf", Some(600), false, None)
            .await
            .unwrap();

        assert_eq!(report.bytes_transferred, 5);
        assert_eq!(report.permissions, Some(600));
        let file = host.host_file("/etc/app.conf").unwrap();
        assert_eq!(file.data, b"hello");
        assert_eq!(file.mode, 600);
    }

    #[tokio::test]
    async fn test_upload_conflict_without_overwrite() {
        let (copier, host) = copier(CapabilitySet::new());
        host.add_host_file("/etc/app.conf", b"old", 644);
        let local = local_file(b"new");

        let err = copier
            .upload(path_str(local.path()), "/etc/app.conf", None, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Conflict { .. }));
        assert_eq!(host.host_file("/etc/app.conf").unwrap().data, b"old");

        copier
            .upload(path_str(local.path()), "/etc/app.conf", None, true, None)
            .await
            .unwrap();
        assert_eq!(host.host_file("/etc/app.conf").unwrap().data, b"new");
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let (copier, host) = copier(CapabilitySet::new());

        let err = copier
            .upload("/nonexistent/relay/file.txt", "/srv/file.txt", None, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Local file not found: /nonexistent/relay/file.txt");
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_local_traversal() {
        let (copier, _host) = copier(CapabilitySet::new());

        let err = copier
            .upload("../secrets.txt", "/srv/file.txt", None, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[tokio::test]
    async fn test_container_copies_require_capability() {
        let (copier, host) = copier(CapabilitySet::new());
        let local = local_file(b"x");

        let err = copier
            .upload(path_str(local.path()), "/etc/app.conf", None, false, Some(101))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::CapabilityUnavailable(_)));
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_upload_into_container_cleans_staging() {
        let (copier, host) = copier(CapabilitySet::new().with(Capability::Containers));
        host.add_container(101);
        let local = local_file(b"hello");

        let report = copier
            .upload(path_str(local.path()), "/etc/app.conf", Some(640), false, Some(101))
            .await
            .unwrap();

        assert_eq!(report.container_id, Some(101));
        let file = host.container_file(101, "/etc/app.conf").unwrap();
        assert_eq!(file.data, b"hello");
        assert_eq!(file.mode, 640);
        let staged: Vec<String> = host
            .commands()
            .iter()
            .filter(|c| c.starts_with("rm -f '/tmp/mcp-relay-upload-"))
            .cloned()
            .collect();
        assert_eq!(staged.len(), 1);
        assert!(local.path().exists());
    }

    #[tokio::test]
    async fn test_download_from_host_creates_parents() {
        let (copier, host) = copier(CapabilitySet::new());
        host.add_host_file("/var/log/app.log", b"log-data", 644);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("logs").join("app.log");

        let report = copier
            .download("/var/log/app.log", path_str(&target), false, None)
            .await
            .unwrap();

        assert_eq!(report.bytes_transferred, 8);
        assert_eq!(std::fs::read(&target).unwrap(), b"log-data");
    }

    #[tokio::test]
    async fn test_download_refuses_existing_local_file() {
        let (copier, host) = copier(CapabilitySet::new());
        host.add_host_file("/var/log/app.log", b"log-data", 644);
        let existing = local_file(b"keep");

        let err = copier
            .download("/var/log/app.log", path_str(existing.path()), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::LocalConflict(_)));
        assert_eq!(std::fs::read(existing.path()).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_download_missing_source() {
        let (copier, _host) = copier(CapabilitySet::new());
        let dir = tempfile::tempdir().unwrap();

        let err = copier
            .download("/var/log/none.log", path_str(&dir.path().join("x")), false, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File not found on host: /var/log/none.log");
    }

    #[tokio::test]
    async fn test_download_from_container_releases_staging_on_failure() {
        let (copier, host) = copier(CapabilitySet::new().with(Capability::Containers));
        host.add_container_file(101, "/etc/nginx/nginx.conf", b"server {}", 644);
        host.set_fail_get(true);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nginx.conf");

        let err = copier
            .download("/etc/nginx/nginx.conf", path_str(&target), false, Some(101))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Remote { .. }));
        let commands = host.commands();
        let pull = commands
            .iter()
            .find(|c| c.starts_with("pct pull 101"))
            .unwrap();
        let staging = pull.rsplit(' ').next().unwrap().trim_matches('\'');
        assert!(!host.host_has(staging));
        assert!(commands.contains(&format!("rm -f '{}'", staging)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_from_container() {
        let (copier, host) = copier(CapabilitySet::new().with(Capability::Containers));
        host.add_container_file(101, "/etc/hostname", b"ct101\n", 644);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("hostname");

        let report = copier
            .download("/etc/hostname", path_str(&target), false, Some(101))
            .await
            .unwrap();

        assert_eq!(report.bytes_transferred, 6);
        assert_eq!(std::fs::read(&target).unwrap(), b"ct101\n");
    }
}
