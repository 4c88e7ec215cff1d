//! Direct file copy tools, offered when the storage relay is off
//!
//! `local_path` always refers to the filesystem of the machine running this
//! server, not the MCP client.

use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    input_schema, permissions_from_number_or_string, validate_container_id, ToolParams,
};
use crate::relay::TransferError;
use crate::ssh::{validate_permissions, validate_remote_path};

pub const SSH_UPLOAD_FILE: &str = "ssh_upload_file";
pub const SSH_DOWNLOAD_FILE: &str = "ssh_download_file";
pub const CONTAINER_UPLOAD_FILE: &str = "proxmox_upload_file_to_container";
pub const CONTAINER_DOWNLOAD_FILE: &str = "proxmox_download_file_from_container";

fn check_paths(local_path: &str, remote_path: &str) -> Result<(), TransferError> {
    validate_remote_path(local_path).map_err(TransferError::validation)?;
    validate_remote_path(remote_path).map_err(TransferError::validation)
}

fn check_permissions(permissions: Option<u32>) -> Result<(), TransferError> {
    match permissions {
        Some(permissions) => validate_permissions(permissions).map_err(TransferError::validation),
        None => Ok(()),
    }
}

/// Parameters for the ssh_upload_file tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SshUploadFileParams {
    /// Path of the file on the server's filesystem
    pub local_path: String,

    /// Absolute destination path on the remote host
    pub remote_path: String,

    /// Octal permissions applied after upload, e.g. 644
    #[serde(default, deserialize_with = "permissions_from_number_or_string")]
    pub permissions: Option<u32>,

    /// Replace the destination if it already exists
    #[serde(default)]
    pub overwrite: bool,
}

impl ToolParams for SshUploadFileParams {
    fn validate(&self) -> Result<(), TransferError> {
        check_paths(&self.local_path, &self.remote_path)?;
        check_permissions(self.permissions)
    }
}

/// Parameters for the ssh_download_file tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SshDownloadFileParams {
    /// Absolute path of the file on the remote host
    pub remote_path: String,

    /// Where to write the file on the server's filesystem
    pub local_path: String,

    /// Replace the local file if it already exists
    #[serde(default)]
    pub overwrite: bool,
}

impl ToolParams for SshDownloadFileParams {
    fn validate(&self) -> Result<(), TransferError> {
        check_paths(&self.local_path, &self.remote_path)
    }
}

/// Parameters for the proxmox_upload_file_to_container tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContainerUploadParams {
    /// Container id (VMID)
    pub ctid: u32,

    /// Path of the file on the server's filesystem
    pub local_path: String,

    /// Absolute destination path inside the container
    pub container_path: String,

    /// Octal permissions applied after upload, e.g. 644
    #[serde(default, deserialize_with = "permissions_from_number_or_string")]
    pub permissions: Option<u32>,

    /// Replace the destination if it already exists
    #[serde(default)]
    pub overwrite: bool,
}

impl ToolParams for ContainerUploadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_container_id(Some(self.ctid))?;
        check_paths(&self.local_path, &self.container_path)?;
        check_permissions(self.permissions)
    }
}

/// Parameters for the proxmox_download_file_from_container tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ContainerDownloadParams {
    /// Container id (VMID)
    pub ctid: u32,

    /// Absolute path of the file inside the container
    pub container_path: String,

    /// Where to write the file on the server's filesystem
    pub local_path: String,

    /// Replace the local file if it already exists
    #[serde(default)]
    pub overwrite: bool,
}

impl ToolParams for ContainerDownloadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_container_id(Some(self.ctid))?;
        check_paths(&self.local_path, &self.container_path)
    }
}

pub fn ssh_upload_file_tool() -> Tool {
    Tool::new(
        SSH_UPLOAD_FILE,
        "Upload a file from the MCP server's filesystem to the remote host over SFTP.",
        input_schema::<SshUploadFileParams>(),
    )
}

pub fn ssh_download_file_tool() -> Tool {
    Tool::new(
        SSH_DOWNLOAD_FILE,
        "Download a file from the remote host to the MCP server's filesystem over SFTP.",
        input_schema::<SshDownloadFileParams>(),
    )
}

pub fn container_upload_file_tool() -> Tool {
    Tool::new(
        CONTAINER_UPLOAD_FILE,
        "Upload a file from the MCP server's filesystem into a Proxmox container. The file is \
         staged on the host and moved in with pct push.",
        input_schema::<ContainerUploadParams>(),
    )
}

pub fn container_download_file_tool() -> Tool {
    Tool::new(
        CONTAINER_DOWNLOAD_FILE,
        "Download a file from a Proxmox container to the MCP server's filesystem. The file is \
         pulled to the host with pct pull and fetched over SFTP.",
        input_schema::<ContainerDownloadParams>(),
    )
}

/// Host copy tools
pub fn direct_tools() -> Vec<Tool> {
    vec![ssh_upload_file_tool(), ssh_download_file_tool()]
}

/// Container copy tools
pub fn container_file_tools() -> Vec<Tool> {
    vec![container_upload_file_tool(), container_download_file_tool()]
}
