//! Proxmox LXC container management
//!
//! Everything goes through `pct` on the host, run by the same
//! [`RemoteExecutor`] the relay uses. Only available when container support
//! is switched on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::relay::container::{
    container_exec_command, is_missing_container, list_command, start_command, status_command,
    stop_command, MANAGEMENT_TIMEOUT,
};
use crate::relay::{RemoteExecutor, TransferError, TransferResult};
use crate::ssh::CommandOutput;

/// One row of `pct list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub ctid: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub ctid: u32,
    pub status: PowerState,
}

/// Reply to start and stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerAction {
    pub success: bool,
    pub message: String,
    pub ctid: u32,
}

/// Parse `pct list` output
///
/// The header row is skipped. A row has three columns when the container is
/// not locked and four when it is.
pub fn parse_pct_list(output: &str) -> Vec<ContainerSummary> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let ctid = parts.first()?.parse().ok()?;
            let (lock, name) = match parts.len() {
                0..=2 => return None,
                3 => (None, parts[2].to_string()),
                _ => (Some(parts[2].to_string()), parts[3..].join(" ")),
            };
            Some(ContainerSummary {
                ctid,
                status: parts[1].to_string(),
                lock,
                name,
            })
        })
        .collect()
}

/// Parse `pct status` output (`status: running`)
pub fn parse_pct_status(output: &str) -> PowerState {
    let output = output.to_lowercase();
    if output.contains("running") {
        PowerState::Running
    } else if output.contains("stopped") {
        PowerState::Stopped
    } else {
        PowerState::Unknown
    }
}

/// Plain-text table of containers
pub fn render_container_table(containers: &[ContainerSummary]) -> String {
    if containers.is_empty() {
        return "No containers found".to_string();
    }
    let mut lines = vec!["CTID | Status  | Name".to_string(), "-".repeat(50)];
    lines.extend(
        containers
            .iter()
            .map(|ct| format!("{:4} | {:7} | {}", ct.ctid, ct.status, ct.name)),
    );
    lines.join("\n")
}

/// Runs `pct` management commands on the host
pub struct ContainerManager {
    remote: Arc<dyn RemoteExecutor>,
}

impl ContainerManager {
    pub fn new(remote: Arc<dyn RemoteExecutor>) -> Self {
        Self { remote }
    }

    async fn run(&self, command: &str, timeout: Duration) -> TransferResult<CommandOutput> {
        debug!("Running: {}", command);
        self.remote
            .execute(command, timeout)
            .await
            .map_err(|e| TransferError::remote(format!("Failed to run '{}'", command), e))
    }

    /// Run `pct` against one container; a missing guest is its own error
    async fn run_for(
        &self,
        ctid: u32,
        command: &str,
        timeout: Duration,
    ) -> TransferResult<CommandOutput> {
        let output = self.run(command, timeout).await?;
        if !output.success() && is_missing_container(&output.stderr) {
            return Err(TransferError::ContainerNotFound(ctid));
        }
        Ok(output)
    }

    /// Run a bash command inside the container
    ///
    /// A nonzero exit is returned as output, not as an error.
    pub async fn exec(
        &self,
        ctid: u32,
        command: &str,
        timeout: Duration,
    ) -> TransferResult<CommandOutput> {
        debug!("Executing in container {}: {}", ctid, command);
        self.run_for(ctid, &container_exec_command(ctid, command), timeout)
            .await
    }

    pub async fn list(&self) -> TransferResult<Vec<ContainerSummary>> {
        let output = self.run(list_command(), MANAGEMENT_TIMEOUT).await?;
        if !output.success() {
            return Err(TransferError::container(format!(
                "Failed to list containers: {}",
                output.failure_detail()
            )));
        }
        Ok(parse_pct_list(&output.stdout))
    }

    pub async fn status(&self, ctid: u32) -> TransferResult<ContainerStatus> {
        let output = self
            .run_for(ctid, &status_command(ctid), MANAGEMENT_TIMEOUT)
            .await?;
        if !output.success() {
            return Err(TransferError::container(format!(
                "Failed to get status of container {}: {}",
                ctid,
                output.failure_detail()
            )));
        }
        Ok(ContainerStatus {
            ctid,
            status: parse_pct_status(&output.stdout),
        })
    }

    /// Start the container; starting a running container succeeds
    pub async fn start(&self, ctid: u32) -> TransferResult<ContainerAction> {
        info!("Starting container {}", ctid);
        let output = self
            .run_for(ctid, &start_command(ctid), MANAGEMENT_TIMEOUT)
            .await?;
        let message = if output.success() {
            format!("Container {} started successfully", ctid)
        } else if output.stderr.contains("already running") {
            format!("Container {} is already running", ctid)
        } else {
            return Err(TransferError::container(format!(
                "Failed to start container {}: {}",
                ctid,
                output.failure_detail()
            )));
        };
        Ok(ContainerAction {
            success: true,
            message,
            ctid,
        })
    }

    /// Stop the container; stopping a stopped container succeeds
    pub async fn stop(&self, ctid: u32) -> TransferResult<ContainerAction> {
        info!("Stopping container {}", ctid);
        let output = self
            .run_for(ctid, &stop_command(ctid), MANAGEMENT_TIMEOUT)
            .await?;
        let message = if output.success() {
            format!("Container {} stopped successfully", ctid)
        } else if output.stderr.contains("not running") {
            format!("Container {} is already stopped", ctid)
        } else {
            return Err(TransferError::container(format!(
                "Failed to stop container {}: {}",
                ctid,
                output.failure_detail()
            )));
        };
        Ok(ContainerAction {
            success: true,
            message,
            ctid,
        })
    }
}
