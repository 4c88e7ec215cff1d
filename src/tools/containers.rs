//! Proxmox container management tools

use rmcp::model::{CallToolResult, Content, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{input_schema, json_result, validate_container_id, ToolParams};
use crate::proxmox::{render_container_table, ContainerStatus, ContainerSummary};
use crate::relay::TransferError;

pub const CONTAINER_EXEC: &str = "proxmox_container_exec_command";
pub const LIST_CONTAINERS: &str = "proxmox_list_containers";
pub const CONTAINER_STATUS: &str = "proxmox_container_status";
pub const START_CONTAINER: &str = "proxmox_start_container";
pub const STOP_CONTAINER: &str = "proxmox_stop_container";

pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;
pub const MAX_EXEC_TIMEOUT_SECS: u64 = 300;

fn default_exec_timeout() -> u64 {
    DEFAULT_EXEC_TIMEOUT_SECS
}

/// Output format of read-only container tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Parameters for the proxmox_container_exec_command tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContainerExecParams {
    /// Container id (VMID)
    pub ctid: u32,

    /// Command run inside the container with bash -c
    pub command: String,

    /// Timeout in seconds (1-300)
    #[serde(default = "default_exec_timeout")]
    pub timeout: u64,
}

impl ToolParams for ContainerExecParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_container_id(Some(self.ctid))?;
        if self.command.trim().is_empty() {
            return Err(TransferError::Validation(
                "command cannot be empty".to_string(),
            ));
        }
        if !(1..=MAX_EXEC_TIMEOUT_SECS).contains(&self.timeout) {
            return Err(TransferError::Validation(format!(
                "timeout must be between 1 and {} seconds",
                MAX_EXEC_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Parameters for the proxmox_list_containers tool
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListContainersParams {
    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl ToolParams for ListContainersParams {
    fn validate(&self) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Parameters for the proxmox_container_status tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContainerStatusParams {
    /// Container id (VMID)
    pub ctid: u32,

    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl ToolParams for ContainerStatusParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_container_id(Some(self.ctid))
    }
}

/// Parameters for proxmox_start_container and proxmox_stop_container
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContainerActionParams {
    /// Container id (VMID)
    pub ctid: u32,
}

impl ToolParams for ContainerActionParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_container_id(Some(self.ctid))
    }
}

/// `pct list` rows in the requested format
pub fn list_result(containers: &[ContainerSummary], format: ResponseFormat) -> CallToolResult {
    match format {
        ResponseFormat::Json => json_result(&containers),
        ResponseFormat::Text => {
            CallToolResult::success(vec![Content::text(render_container_table(containers))])
        }
    }
}

pub fn status_result(status: &ContainerStatus, format: ResponseFormat) -> CallToolResult {
    match format {
        ResponseFormat::Json => json_result(status),
        ResponseFormat::Text => CallToolResult::success(vec![Content::text(format!(
            "Container {}: {}",
            status.ctid, status.status
        ))]),
    }
}

pub fn container_exec_tool() -> Tool {
    Tool::new(
        CONTAINER_EXEC,
        "Execute a shell command inside a Proxmox LXC container with pct exec.",
        input_schema::<ContainerExecParams>(),
    )
}

pub fn list_containers_tool() -> Tool {
    Tool::new(
        LIST_CONTAINERS,
        "List Proxmox LXC containers on the host with their status.",
        input_schema::<ListContainersParams>(),
    )
}

pub fn container_status_tool() -> Tool {
    Tool::new(
        CONTAINER_STATUS,
        "Show whether a Proxmox LXC container is running or stopped.",
        input_schema::<ContainerStatusParams>(),
    )
}

pub fn start_container_tool() -> Tool {
    Tool::new(
        START_CONTAINER,
        "Start a Proxmox LXC container. Starting a running container is not an error.",
        input_schema::<ContainerActionParams>(),
    )
}

pub fn stop_container_tool() -> Tool {
    Tool::new(
        STOP_CONTAINER,
        "Stop a Proxmox LXC container. Stopping a stopped container is not an error.",
        input_schema::<ContainerActionParams>(),
    )
}

/// The five management tools
pub fn container_tools() -> Vec<Tool> {
    vec![
        container_exec_tool(),
        list_containers_tool(),
        container_status_tool(),
        start_container_tool(),
        stop_container_tool(),
    ]
}
