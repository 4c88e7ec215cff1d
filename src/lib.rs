//! SSH Relay MCP Server - A Model Context Protocol server for remote SSH
//! command execution and file transfer
//!
//! This crate provides an MCP server that executes commands on a remote
//! Linux host over SSH and moves files between the MCP client and that host
//! (or a Proxmox container on it). Files never travel over the MCP channel:
//! they are relayed through ImageKit object storage in two phases.
//!
//! # Features
//!
//! - Execute shell commands on the remote SSH server (`exec` tool)
//! - Two-phase uploads: the client pushes to storage with a signed curl
//!   command, the server delivers to the host over SFTP
//! - Two-phase downloads: the server publishes to storage, the client pulls
//!   with curl
//! - Optional routing into Proxmox containers with `pct push`/`pct pull`
//! - Persistent SSH connection with lazy connect and reconnect
//!
//! # MCP Tools
//!
//! - `exec` - Execute a shell command on the remote SSH server
//! - `request_upload` / `confirm_upload` - Upload a file to the host
//! - `request_download` / `confirm_download` - Download a file from the host
//! - `ssh_upload_file` / `ssh_download_file` - Copy files between the server's
//!   filesystem and the host over SFTP
//! - `proxmox_container_exec_command`, `proxmox_list_containers`,
//!   `proxmox_container_status`, `proxmox_start_container`,
//!   `proxmox_stop_container` - Manage Proxmox containers
//! - `proxmox_upload_file_to_container` /
//!   `proxmox_download_file_from_container` - Direct container copies
//!
//! The transfer tools are only listed when ImageKit credentials are set; the
//! direct copy tools take their place otherwise. The `proxmox_*` tools need
//! `--enable-containers`.
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ssh-relay-mcp --host=192.168.1.100 --user=root --key=~/.ssh/id_ed25519 \
//!   --imagekit-public-key=public_xxx --imagekit-private-key=private_xxx \
//!   --imagekit-url-endpoint=https://ik.imagekit.io/demo --enable-containers
//! ```

pub mod config;
pub mod error;
pub mod proxmox;
pub mod relay;
pub mod server;
pub mod ssh;
pub mod storage;
pub mod tools;

// Re-exports for convenience
pub use config::{Args, Config, StorageConfig};
pub use error::{RelayError, Result};
pub use proxmox::ContainerManager;
pub use relay::{
    CapabilitySet, DirectCopier, RelayOrchestrator, TransferError, TransferLedger,
};
pub use server::SshRelayServer;
pub use ssh::{CommandOutput, SshConfig, SshConnectionManager, SshHandler};
pub use storage::{ImageKitGateway, ObjectStore};
