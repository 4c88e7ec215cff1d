//! MCP tool definitions and parameter types
//!
//! Tools are dispatched by [`SshRelayServer`](crate::server::SshRelayServer)
//! through its `ServerHandler` implementation. This module owns what the
//! client sees: tool names, descriptions, input schemas, argument validation
//! and the shape of failure payloads.
//!
//! Available tools:
//! - `exec` - Execute shell commands on the remote SSH server
//! - `request_upload` / `confirm_upload` - Two-phase upload through object storage
//! - `request_download` / `confirm_download` - Two-phase download through object storage
//! - `ssh_upload_file` / `ssh_download_file` - Direct SFTP copies (no storage)
//! - `proxmox_*` - Container management and direct container copies

pub mod containers;
pub mod files;

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::relay::container::{MAX_CONTAINER_ID, MIN_CONTAINER_ID};
use crate::relay::TransferError;
use crate::ssh::{validate_permissions, validate_remote_path, CommandOutput};

pub const EXEC: &str = "exec";
pub const REQUEST_UPLOAD: &str = "request_upload";
pub const CONFIRM_UPLOAD: &str = "confirm_upload";
pub const REQUEST_DOWNLOAD: &str = "request_download";
pub const CONFIRM_DOWNLOAD: &str = "confirm_download";

/// Typed, validated arguments of one tool
pub trait ToolParams: DeserializeOwned {
    fn validate(&self) -> Result<(), TransferError>;
}

/// Deserialize and validate tool arguments
///
/// Malformed arguments (wrong types, bad permission strings) are reported
/// the same way as values that fail validation.
pub fn parse_params<T: ToolParams>(args: JsonObject) -> Result<T, TransferError> {
    let params: T = serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| TransferError::Validation(format!("Input validation error: {}", e)))?;
    params.validate()?;
    Ok(params)
}

/// Parameters for the exec tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ExecParams {
    /// Shell command to execute on the remote SSH server
    pub command: String,
}

/// Parameters for the request_upload tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RequestUploadParams {
    /// Absolute path on the remote host (or inside the container) to write
    pub destination_path: String,

    /// Octal permissions applied after upload, e.g. 644
    #[serde(default, deserialize_with = "permissions_from_number_or_string")]
    pub permissions: Option<u32>,

    /// Replace the destination if it already exists
    #[serde(default)]
    pub overwrite: bool,

    /// Proxmox container to deliver into (requires container support)
    #[serde(default)]
    pub container_id: Option<u32>,
}

/// Parameters for the confirm_upload tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ConfirmUploadParams {
    /// Transfer id returned by request_upload
    pub transfer_id: String,

    /// Storage file id from the upload response, if known
    #[serde(default)]
    pub object_id: Option<String>,
}

/// Parameters for the request_download tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RequestDownloadParams {
    /// Absolute path of the file on the remote host (or inside the container)
    pub source_path: String,

    /// Proxmox container to read from (requires container support)
    #[serde(default)]
    pub container_id: Option<u32>,
}

/// Parameters for the confirm_download tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ConfirmDownloadParams {
    /// Transfer id returned by request_download
    pub transfer_id: String,
}

/// Accept `644` as well as `"644"` / `"0644"`
pub(crate) fn permissions_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid permissions: {}", s))),
    }
}

pub(crate) fn validate_container_id(container_id: Option<u32>) -> Result<(), TransferError> {
    match container_id {
        Some(id) if !(MIN_CONTAINER_ID..=MAX_CONTAINER_ID).contains(&id) => {
            Err(TransferError::Validation(format!(
                "Invalid container id {}: must be between {} and {}",
                id, MIN_CONTAINER_ID, MAX_CONTAINER_ID
            )))
        }
        _ => Ok(()),
    }
}

fn validate_id(name: &str, value: &str) -> Result<(), TransferError> {
    if value.trim().is_empty() {
        return Err(TransferError::Validation(format!("{} cannot be empty", name)));
    }
    Ok(())
}

impl ToolParams for RequestUploadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_remote_path(&self.destination_path).map_err(TransferError::validation)?;
        if let Some(permissions) = self.permissions {
            validate_permissions(permissions).map_err(TransferError::validation)?;
        }
        validate_container_id(self.container_id)
    }
}

impl ToolParams for ConfirmUploadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_id("transfer_id", &self.transfer_id)?;
        if let Some(object_id) = &self.object_id {
            validate_id("object_id", object_id)?;
        }
        Ok(())
    }
}

impl ToolParams for RequestDownloadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_remote_path(&self.source_path).map_err(TransferError::validation)?;
        validate_container_id(self.container_id)
    }
}

impl ToolParams for ConfirmDownloadParams {
    fn validate(&self) -> Result<(), TransferError> {
        validate_id("transfer_id", &self.transfer_id)
    }
}

/// Body of a failed transfer tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&TransferError> for ToolFailure {
    fn from(err: &TransferError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            suggestion: err.suggestion().map(str::to_string),
        }
    }
}

/// Successful tool result carrying `value` as pretty JSON
pub fn json_result<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => CallToolResult::error(vec![Content::text(format!("Error: {}", e))]),
    }
}

/// Command output as a tool result, stderr after a separator
///
/// A nonzero exit code marks the result as an error.
pub fn command_result(output: CommandOutput) -> CallToolResult {
    let failed = !output.success();
    let mut text = output.stdout;
    if !output.stderr.is_empty() {
        if !text.is_empty() {
            text.push_str("\n--- stderr ---\n");
        }
        text.push_str(&output.stderr);
    }

    if failed {
        CallToolResult::error(vec![Content::text(text)])
    } else {
        CallToolResult::success(vec![Content::text(text)])
    }
}

/// Error tool result carrying the failure JSON
pub fn failure_result(err: &TransferError) -> CallToolResult {
    let failure = ToolFailure::from(err);
    let text = serde_json::to_string_pretty(&failure).unwrap_or_else(|_| failure.error.clone());
    CallToolResult::error(vec![Content::text(text)])
}

/// Input schema derived from a parameter type
pub(crate) fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    Arc::new(schema.as_object().cloned().unwrap_or_default())
}

pub fn exec_tool() -> Tool {
    Tool::new(
        EXEC,
        "Execute a shell command on the remote SSH server and return the output.",
        input_schema::<ExecParams>(),
    )
}

pub fn request_upload_tool() -> Tool {
    Tool::new(
        REQUEST_UPLOAD,
        "Start uploading a file to the remote host. Returns a curl command: replace \
         <YOUR_FILE_PATH> with the local file, run it, then call confirm_upload with the \
         transfer_id.",
        input_schema::<RequestUploadParams>(),
    )
}

pub fn confirm_upload_tool() -> Tool {
    Tool::new(
        CONFIRM_UPLOAD,
        "Finish an upload after its curl command has run. Copies the file to its destination \
         and removes it from temporary storage.",
        input_schema::<ConfirmUploadParams>(),
    )
}

pub fn request_download_tool() -> Tool {
    Tool::new(
        REQUEST_DOWNLOAD,
        "Prepare a file on the remote host for download. Returns a URL and a curl command; \
         replace <YOUR_FILE_PATH> with the local target, run it, then call confirm_download.",
        input_schema::<RequestDownloadParams>(),
    )
}

pub fn confirm_download_tool() -> Tool {
    Tool::new(
        CONFIRM_DOWNLOAD,
        "Finish a download and delete the temporary copy from storage.",
        input_schema::<ConfirmDownloadParams>(),
    )
}

/// The four relay tools
pub fn transfer_tools() -> Vec<Tool> {
    vec![
        request_upload_tool(),
        confirm_upload_tool(),
        request_download_tool(),
        confirm_download_tool(),
    ]
}
