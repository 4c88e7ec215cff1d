//! MCP Server implementation
//!
//! This module provides the main MCP server that integrates SSH connection
//! management with the `exec` tool and one of two file surfaces: the
//! two-phase storage relay when object storage is configured, direct SFTP
//! copies otherwise. Proxmox tools are added when containers are enabled.

use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::proxmox::ContainerManager;
use crate::relay::{
    Capability, CapabilitySet, DirectCopier, RelayOrchestrator, TransferError, TransferLedger,
    TransferOptions, TransferResult,
};
use crate::ssh::{sanitize_command, SshConfig, SshConnectionManager};
use crate::storage::{ImageKitGateway, ObjectStore};
use crate::tools::containers::{
    self, ContainerActionParams, ContainerExecParams, ContainerStatusParams,
    ListContainersParams,
};
use crate::tools::files::{
    self, ContainerDownloadParams, ContainerUploadParams, SshDownloadFileParams,
    SshUploadFileParams,
};
use crate::tools::{
    self, parse_params, ConfirmDownloadParams, ConfirmUploadParams, ExecParams,
    RequestDownloadParams, RequestUploadParams,
};

/// SSH relay MCP server
///
/// Provides remote command execution and, when storage credentials are
/// configured, a two-phase file relay between the client and the host.
#[derive(Clone)]
pub struct SshRelayServer {
    /// Server configuration
    config: Config,

    /// SSH connection manager
    connection: Arc<SshConnectionManager>,

    /// Command execution timeout
    timeout: Duration,

    /// Maximum command length
    max_chars: Option<usize>,

    /// File relay (None when storage is not configured)
    relay: Option<Arc<RelayOrchestrator>>,

    /// Direct SFTP copies (only when the relay is off)
    direct: Option<Arc<DirectCopier>>,

    /// Proxmox management (only with container support)
    containers: Option<Arc<ContainerManager>>,
}

impl SshRelayServer {
    /// Create a new server
    ///
    /// This sets up the SSH connection manager and, if configured, the
    /// storage gateway. Connection is not established until a tool is used.
    pub async fn new(config: Config) -> Result<Self> {
        let mut ssh_config = SshConfig::new(&config.host, &config.user)
            .with_port(config.port)
            .with_max_file_size(config.max_file_size);

        if let Some(ref password) = config.password {
            ssh_config = ssh_config.with_password(password);
        }

        if let Some(ref key_path) = config.key {
            let key_content = tokio::fs::read_to_string(key_path)
                .await
                .map_err(RelayError::Io)?;
            ssh_config = ssh_config.with_private_key(&key_content);
        }

        let connection = Arc::new(SshConnectionManager::new(ssh_config));
        let capabilities = Self::capabilities(&config);

        let relay = match config.storage {
            Some(ref storage) => {
                let store: Arc<dyn ObjectStore> = Arc::new(ImageKitGateway::new(storage)?);
                Some(Arc::new(Self::build_relay(&config, store, connection.clone())))
            }
            None => None,
        };

        let direct = relay.is_none().then(|| {
            Arc::new(DirectCopier::new(
                connection.clone(),
                connection.clone(),
                capabilities.clone(),
            ))
        });

        let containers = capabilities
            .is_enabled(Capability::Containers)
            .then(|| Arc::new(ContainerManager::new(connection.clone())));

        let timeout = Duration::from_millis(config.timeout_ms);
        let max_chars = config.max_chars;

        Ok(Self {
            config,
            connection,
            timeout,
            max_chars,
            relay,
            direct,
            containers,
        })
    }

    fn capabilities(config: &Config) -> CapabilitySet {
        let mut capabilities = CapabilitySet::new();
        if config.enable_containers {
            capabilities.enable(Capability::Containers);
        }
        capabilities
    }

    /// Wire the relay to the SSH connection and a storage backend
    pub fn build_relay(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        connection: Arc<SshConnectionManager>,
    ) -> RelayOrchestrator {
        let transfer_timeout = config
            .storage
            .as_ref()
            .map_or(crate::config::DEFAULT_TRANSFER_TIMEOUT_SECS, |s| {
                s.transfer_timeout_secs
            });

        RelayOrchestrator::new(
            TransferLedger::new(Duration::from_secs(transfer_timeout)),
            store,
            connection.clone(),
            connection,
            Self::capabilities(config),
        )
    }

    /// Get a reference to the SSH connection manager
    pub fn connection(&self) -> &Arc<SshConnectionManager> {
        &self.connection
    }

    /// The file relay, when enabled
    pub fn relay(&self) -> Option<&Arc<RelayOrchestrator>> {
        self.relay.as_ref()
    }

    /// Close the server and cleanup resources
    pub async fn shutdown(&self) {
        info!("Shutting down SSH relay MCP server...");
        if let Some(relay) = &self.relay {
            let pending = relay.ledger().active_count().await;
            if pending > 0 {
                info!("Dropping {} unfinished transfer(s)", pending);
            }
            relay.ledger().clear().await;
        }
        self.connection.close().await;
    }

    /// Execute a command (used by exec tool)
    async fn execute_command(
        &self,
        command: &str,
    ) -> std::result::Result<CallToolResult, McpError> {
        debug!("exec tool called with command: {}", command);

        let sanitized = match sanitize_command(command, self.max_chars) {
            Ok(cmd) => cmd,
            Err(e) => {
                error!("Command sanitization failed: {}", e);
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error: {}",
                    e
                ))]));
            }
        };

        match self.connection.exec_command(&sanitized, self.timeout).await {
            Ok(output) => Ok(tools::command_result(output)),
            Err(e) => {
                error!("Command execution failed: {}", e);
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error: {}",
                    e
                ))]))
            }
        }
    }

    /// Run one relay tool with validated, typed arguments
    async fn call_transfer_tool(
        &self,
        relay: &RelayOrchestrator,
        name: &str,
        args: JsonObject,
    ) -> TransferResult<CallToolResult> {
        match name {
            tools::REQUEST_UPLOAD => {
                let params: RequestUploadParams = parse_params(args)?;
                let options = TransferOptions {
                    permissions: params.permissions,
                    overwrite: params.overwrite,
                    container_id: params.container_id,
                };
                let ticket = relay
                    .request_upload(&params.destination_path, options)
                    .await?;
                Ok(tools::json_result(&ticket))
            }
            tools::CONFIRM_UPLOAD => {
                let params: ConfirmUploadParams = parse_params(args)?;
                let confirmation = relay
                    .confirm_upload(&params.transfer_id, params.object_id.as_deref())
                    .await?;
                Ok(tools::json_result(&confirmation))
            }
            tools::REQUEST_DOWNLOAD => {
                let params: RequestDownloadParams = parse_params(args)?;
                let ticket = relay
                    .request_download(&params.source_path, params.container_id)
                    .await?;
                Ok(tools::json_result(&ticket))
            }
            tools::CONFIRM_DOWNLOAD => {
                let params: ConfirmDownloadParams = parse_params(args)?;
                let confirmation = relay.confirm_download(&params.transfer_id).await?;
                Ok(tools::json_result(&confirmation))
            }
            _ => Err(unknown_tool(name)),
        }
    }

    /// Run one direct copy tool
    async fn call_copy_tool(
        &self,
        direct: &DirectCopier,
        name: &str,
        args: JsonObject,
    ) -> TransferResult<CallToolResult> {
        let report = match name {
            files::SSH_UPLOAD_FILE => {
                let params: SshUploadFileParams = parse_params(args)?;
                direct
                    .upload(
                        &params.local_path,
                        &params.remote_path,
                        params.permissions,
                        params.overwrite,
                        None,
                    )
                    .await?
            }
            files::SSH_DOWNLOAD_FILE => {
                let params: SshDownloadFileParams = parse_params(args)?;
                direct
                    .download(&params.remote_path, &params.local_path, params.overwrite, None)
                    .await?
            }
            files::CONTAINER_UPLOAD_FILE => {
                let params: ContainerUploadParams = parse_params(args)?;
                direct
                    .upload(
                        &params.local_path,
                        &params.container_path,
                        params.permissions,
                        params.overwrite,
                        Some(params.ctid),
                    )
                    .await?
            }
            files::CONTAINER_DOWNLOAD_FILE => {
                let params: ContainerDownloadParams = parse_params(args)?;
                direct
                    .download(
                        &params.container_path,
                        &params.local_path,
                        params.overwrite,
                        Some(params.ctid),
                    )
                    .await?
            }
            _ => return Err(unknown_tool(name)),
        };
        Ok(tools::json_result(&report))
    }

    /// Run one Proxmox management tool
    async fn call_container_tool(
        &self,
        name: &str,
        args: JsonObject,
    ) -> TransferResult<CallToolResult> {
        let manager = self
            .containers
            .as_ref()
            .ok_or(TransferError::CapabilityUnavailable(Capability::Containers))?;

        match name {
            containers::CONTAINER_EXEC => {
                let params: ContainerExecParams = parse_params(args)?;
                let command = sanitize_command(&params.command, self.max_chars)
                    .map_err(TransferError::validation)?;
                let output = manager
                    .exec(params.ctid, &command, Duration::from_secs(params.timeout))
                    .await?;
                Ok(tools::command_result(output))
            }
            containers::LIST_CONTAINERS => {
                let params: ListContainersParams = parse_params(args)?;
                let list = manager.list().await?;
                Ok(containers::list_result(&list, params.response_format))
            }
            containers::CONTAINER_STATUS => {
                let params: ContainerStatusParams = parse_params(args)?;
                let status = manager.status(params.ctid).await?;
                Ok(containers::status_result(&status, params.response_format))
            }
            containers::START_CONTAINER => {
                let params: ContainerActionParams = parse_params(args)?;
                Ok(tools::json_result(&manager.start(params.ctid).await?))
            }
            containers::STOP_CONTAINER => {
                let params: ContainerActionParams = parse_params(args)?;
                Ok(tools::json_result(&manager.stop(params.ctid).await?))
            }
            _ => Err(unknown_tool(name)),
        }
    }

    /// Tools offered with the current configuration
    fn available_tools(&self) -> Vec<Tool> {
        let mut list = vec![tools::exec_tool()];
        if self.relay.is_some() {
            list.extend(tools::transfer_tools());
        } else {
            list.extend(files::direct_tools());
        }
        if self.containers.is_some() {
            list.extend(containers::container_tools());
            if self.relay.is_none() {
                list.extend(files::container_file_tools());
            }
        }
        list
    }

    /// Route a tool call by name
    async fn dispatch(
        &self,
        name: &str,
        args: JsonObject,
    ) -> std::result::Result<CallToolResult, McpError> {
        match name {
            tools::EXEC => {
                let params: ExecParams = parse_args(args)?;
                self.execute_command(&params.command).await
            }
            tools::REQUEST_UPLOAD
            | tools::CONFIRM_UPLOAD
            | tools::REQUEST_DOWNLOAD
            | tools::CONFIRM_DOWNLOAD => match &self.relay {
                Some(relay) => Ok(tool_outcome(
                    name,
                    self.call_transfer_tool(relay, name, args).await,
                )),
                None => Err(McpError::invalid_params(
                    format!(
                        "{} is unavailable: configure ImageKit credentials to enable the file relay",
                        name
                    ),
                    None,
                )),
            },
            files::SSH_UPLOAD_FILE
            | files::SSH_DOWNLOAD_FILE
            | files::CONTAINER_UPLOAD_FILE
            | files::CONTAINER_DOWNLOAD_FILE => match &self.direct {
                Some(direct) => Ok(tool_outcome(
                    name,
                    self.call_copy_tool(direct, name, args).await,
                )),
                None => Err(McpError::invalid_params(
                    format!(
                        "{} is unavailable while the file relay is enabled: use request_upload or request_download",
                        name
                    ),
                    None,
                )),
            },
            containers::CONTAINER_EXEC
            | containers::LIST_CONTAINERS
            | containers::CONTAINER_STATUS
            | containers::START_CONTAINER
            | containers::STOP_CONTAINER => Ok(tool_outcome(
                name,
                self.call_container_tool(name, args).await,
            )),
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", name),
                None,
            )),
        }
    }

    fn instructions(&self) -> String {
        let mut text = format!(
            "SSH relay MCP server v{} - Execute commands on {}@{}:{}",
            env!("CARGO_PKG_VERSION"),
            self.config.user,
            self.config.host,
            self.config.port,
        );
        let containers = self.containers.is_some();
        match &self.relay {
            Some(_) => {
                text.push_str(". File relay enabled: use request_upload/confirm_upload and request_download/confirm_download");
                if containers {
                    text.push_str(", with container_id for Proxmox containers");
                }
            }
            None => text.push_str(
                ". File relay disabled (no storage credentials): use ssh_upload_file/ssh_download_file for direct SFTP copies",
            ),
        }
        if containers {
            text.push_str(". Proxmox container tools enabled (proxmox_*)");
        }
        text
    }
}

/// Deserialize tool arguments, rejecting malformed input as invalid params
fn parse_args<T: DeserializeOwned>(args: JsonObject) -> std::result::Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {}", e), None))
}

fn unknown_tool(name: &str) -> TransferError {
    TransferError::Validation(format!("Unknown tool: {}", name))
}

/// Turn a failed tool run into its structured error result
fn tool_outcome(name: &str, result: TransferResult<CallToolResult>) -> CallToolResult {
    result.unwrap_or_else(|e| {
        error!("{} failed: {}", name, e);
        tools::failure_result(&e)
    })
}

impl ServerHandler for SshRelayServer {
    /// Return server information
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(self.instructions()),
        }
    }

    /// List available tools
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        debug!("list_tools called");

        Ok(ListToolsResult {
            tools: self.available_tools(),
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Call a tool
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let tool_name: &str = request.name.as_ref();
        debug!("call_tool called: {:?}", tool_name);

        let args = request.arguments.unwrap_or_default();
        self.dispatch(tool_name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::relay::testing::FakeStore;

    fn config(storage: bool, containers: bool) -> Config {
        Config {
            host: "10.0.0.5".to_string(),
            port: 22,
            user: "admin".to_string(),
            password: Some("secret".to_string()),
            key: None,
            timeout_ms: 60_000,
            max_chars: Some(1000),
            max_file_size: 10 * 1024 * 1024,
            enable_containers: containers,
            storage: storage.then(|| StorageConfig {
                public_key: "public_test_key".to_string(),
                private_key: "private_test_key".to_string(),
                url_endpoint: "https://ik.imagekit.io/demo".to_string(),
                folder: "/mcp-remote-exec".to_string(),
                transfer_timeout_secs: 120,
                max_object_size: 10 * 1024 * 1024,
            }),
        }
    }

    fn args(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn tool_names(server: &SshRelayServer) -> Vec<String> {
        server
            .available_tools()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect()
    }

    fn body(result: &CallToolResult) -> serde_json::Value {
        let content = serde_json::to_value(&result.content).unwrap();
        serde_json::from_str(content[0]["text"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_relay_only_with_storage() {
        let server = SshRelayServer::new(config(false, false)).await.unwrap();
        assert!(server.relay().is_none());
        assert!(server.instructions().contains("File relay disabled"));
        assert!(server.instructions().contains("ssh_upload_file"));

        let server = SshRelayServer::new(config(true, true)).await.unwrap();
        let relay = server.relay().unwrap();
        assert_eq!(relay.ledger().timeout(), Duration::from_secs(120));
        assert!(relay.capabilities().is_enabled(Capability::Containers));
        assert!(server.instructions().contains("container_id"));
        assert!(server.instructions().contains("proxmox_"));
    }

    #[test]
    fn test_build_relay_without_containers() {
        let config = config(true, false);
        let connection = Arc::new(SshConnectionManager::new(SshConfig::new("h", "u")));
        let relay = SshRelayServer::build_relay(&config, Arc::new(FakeStore::new()), connection);
        assert!(!relay.capabilities().is_enabled(Capability::Containers));
    }

    #[tokio::test]
    async fn test_tool_listing_follows_configuration() {
        let server = SshRelayServer::new(config(false, false)).await.unwrap();
        assert_eq!(
            tool_names(&server),
            vec![tools::EXEC, files::SSH_UPLOAD_FILE, files::SSH_DOWNLOAD_FILE]
        );

        let server = SshRelayServer::new(config(true, false)).await.unwrap();
        assert_eq!(
            tool_names(&server),
            vec![
                tools::EXEC,
                tools::REQUEST_UPLOAD,
                tools::CONFIRM_UPLOAD,
                tools::REQUEST_DOWNLOAD,
                tools::CONFIRM_DOWNLOAD
            ]
        );

        let names = tool_names(&SshRelayServer::new(config(true, true)).await.unwrap());
        assert!(names.contains(&containers::LIST_CONTAINERS.to_string()));
        assert!(!names.contains(&files::CONTAINER_UPLOAD_FILE.to_string()));
        assert!(!names.contains(&files::SSH_UPLOAD_FILE.to_string()));

        let names = tool_names(&SshRelayServer::new(config(false, true)).await.unwrap());
        assert_eq!(names.len(), 1 + 2 + 5 + 2);
        assert!(names.contains(&files::CONTAINER_DOWNLOAD_FILE.to_string()));
        assert!(names.contains(&containers::CONTAINER_EXEC.to_string()));
    }

    #[tokio::test]
    async fn test_malformed_transfer_arguments_are_structured_failures() {
        let server = SshRelayServer::new(config(true, false)).await.unwrap();

        for bad in [
            serde_json::json!({"destination_path": "/etc/app.conf", "permissions": "rwx"}),
            serde_json::json!({"destination_path": "/etc/app.conf", "permissions": -644}),
            serde_json::json!({"destination_path": "/etc/app.conf", "container_id": -5}),
        ] {
            let result = server
                .dispatch(tools::REQUEST_UPLOAD, args(bad))
                .await
                .unwrap();
            assert_eq!(result.is_error, Some(true));
            let body = body(&result);
            assert_eq!(body["success"], serde_json::json!(false));
            assert!(body["error"]
                .as_str()
                .unwrap()
                .starts_with("Input validation error"));
        }

        let result = server
            .dispatch(tools::CONFIRM_DOWNLOAD, args(serde_json::json!({"transfer_id": 5})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_transfer_tool_failures_are_structured() {
        let server = SshRelayServer::new(config(true, false)).await.unwrap();

        let result = server
            .dispatch(tools::CONFIRM_DOWNLOAD, args(serde_json::json!({"transfer_id": "missing"})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let result = server
            .dispatch(
                tools::REQUEST_UPLOAD,
                args(serde_json::json!({"destination_path": "/etc/app.conf", "container_id": 101})),
            )
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert!(body["error"].as_str().unwrap().contains("containers"));
        assert!(body["suggestion"]
            .as_str()
            .unwrap()
            .contains("--enable-containers"));
    }

    #[tokio::test]
    async fn test_tools_outside_configuration_are_rejected() {
        let server = SshRelayServer::new(config(true, false)).await.unwrap();
        let err = server
            .dispatch(
                files::SSH_UPLOAD_FILE,
                args(serde_json::json!({"local_path": "/tmp/a", "remote_path": "/tmp/b"})),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("file relay is enabled"));

        let server = SshRelayServer::new(config(false, false)).await.unwrap();
        let err = server
            .dispatch(tools::CONFIRM_DOWNLOAD, args(serde_json::json!({"transfer_id": "t"})))
            .await
            .unwrap_err();
        assert!(err.message.contains("configure ImageKit credentials"));

        let result = server
            .dispatch(containers::LIST_CONTAINERS, JsonObject::new())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(body(&result)["suggestion"]
            .as_str()
            .unwrap()
            .contains("--enable-containers"));

        let result = server
            .dispatch(
                files::CONTAINER_UPLOAD_FILE,
                args(serde_json::json!({
                    "ctid": 101,
                    "local_path": "/tmp/a",
                    "container_path": "/srv/a"
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(body(&result)["error"]
            .as_str()
            .unwrap()
            .contains("containers"));

        assert!(server.dispatch("nope", JsonObject::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_direct_upload_rejects_missing_local_file() {
        let server = SshRelayServer::new(config(false, false)).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.conf");

        let result = server
            .dispatch(
                files::SSH_UPLOAD_FILE,
                args(serde_json::json!({
                    "local_path": missing.to_string_lossy(),
                    "remote_path": "/etc/app.conf",
                    "permissions": "0640"
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_container_exec_arguments_are_validated() {
        let server = SshRelayServer::new(config(false, true)).await.unwrap();
        let result = server
            .dispatch(
                containers::CONTAINER_EXEC,
                args(serde_json::json!({"ctid": 100, "command": "uptime", "timeout": 0})),
            )
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(body(&result)["error"]
            .as_str()
            .unwrap()
            .contains("timeout must be between"));
    }
}
