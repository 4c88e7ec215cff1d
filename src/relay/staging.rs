//! Hops through the host shared by relayed and direct copies
//!
//! Containers are never reached over SFTP: files are staged in a host temp
//! file and moved across with `pct push` / `pct pull`.

use std::path::Path;

use tracing::{info, warn};

use super::container::{
    chmod_command, exists_command, pull_command, push_command, Location, CHMOD_TIMEOUT,
    CONTAINER_COPY_TIMEOUT, EXISTS_TIMEOUT,
};
use super::error::{TransferError, TransferResult};
use super::remote::{FileCopier, RemoteExecutor};
use super::temp::HostTempFile;
use crate::error::RelayError;

/// `test -f` at `location`; exit 1 means absent, anything else odd is an error
pub async fn check_exists(
    remote: &dyn RemoteExecutor,
    location: Location,
    path: &str,
) -> TransferResult<bool> {
    let output = remote
        .execute(&exists_command(location, path), EXISTS_TIMEOUT)
        .await
        .map_err(|e| TransferError::remote(format!("Failed to check {} {}", path, location), e))?;

    match output.exit_code {
        Some(0) => Ok(true),
        Some(1) if output.stderr.trim().is_empty() => Ok(false),
        _ => {
            let detail = output.failure_detail();
            match location {
                Location::Container(id) => Err(TransferError::container(format!(
                    "Failed to access container {}: {}",
                    id, detail
                ))),
                Location::Host => Err(TransferError::remote(
                    format!("Failed to check {} {}", path, location),
                    RelayError::command(detail),
                )),
            }
        }
    }
}

/// Run a `pct` copy and turn any failure into its detail text
async fn run_copy(remote: &dyn RemoteExecutor, command: &str) -> Option<String> {
    match remote.execute(command, CONTAINER_COPY_TIMEOUT).await {
        Ok(output) if output.success() => None,
        Ok(output) => Some(output.failure_detail()),
        Err(e) => Some(e.to_string()),
    }
}

/// Stage `local_path` on the host, push it into the container, then chmod
///
/// Returns the bytes staged. The caller releases `staging`.
pub async fn push_into_container(
    remote: &dyn RemoteExecutor,
    files: &dyn FileCopier,
    local_path: &Path,
    staging: &HostTempFile,
    container_id: u32,
    destination: &str,
    permissions: Option<u32>,
) -> TransferResult<u64> {
    let staged = files
        .put(local_path, staging.path(), None, true)
        .await
        .map_err(|e| TransferError::remote("Failed to stage file on host", e))?;

    let push = push_command(container_id, staging.path(), destination);
    if let Some(detail) = run_copy(remote, &push).await {
        return Err(TransferError::container(format!(
            "Failed to push file to container {}: {}",
            container_id, detail
        )));
    }

    if let Some(permissions) = permissions {
        let chmod = chmod_command(container_id, permissions, destination);
        match remote.execute(&chmod, CHMOD_TIMEOUT).await {
            Ok(output) if output.success() => info!(
                "Set permissions {} on {} in container {}",
                permissions, destination, container_id
            ),
            Ok(output) => warn!(
                "Failed to set permissions on {}: {}",
                destination,
                output.failure_detail()
            ),
            Err(e) => warn!("Failed to set permissions on {}: {}", destination, e),
        }
    }

    Ok(staged.bytes)
}

/// `pct pull` a container file into `staging`
///
/// `staging` is released here when the pull fails.
pub async fn pull_from_container(
    remote: &dyn RemoteExecutor,
    container_id: u32,
    container_path: &str,
    staging: HostTempFile,
) -> TransferResult<HostTempFile> {
    let pull = pull_command(container_id, container_path, staging.path());
    match run_copy(remote, &pull).await {
        None => Ok(staging),
        Some(detail) => {
            staging.release(remote).await;
            Err(TransferError::container(format!(
                "Failed to pull file from container {}: {}",
                container_id, detail
            )))
        }
    }
}
