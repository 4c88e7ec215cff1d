//! Where a transfer lands and the shell commands that reach it
//!
//! Containers are Proxmox LXC guests driven through `pct` on the host. Every
//! path is single-quoted before it is interpolated.

use std::fmt;
use std::time::Duration;

use crate::ssh::quote_for_shell;

/// Existence check (`test -f`)
pub const EXISTS_TIMEOUT: Duration = Duration::from_secs(10);

/// `pct push` / `pct pull`
pub const CONTAINER_COPY_TIMEOUT: Duration = Duration::from_secs(30);

pub const CHMOD_TIMEOUT: Duration = Duration::from_secs(10);

/// Host temp file removal
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// `pct list`, `pct status`, `pct start` and `pct stop`
pub const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest Proxmox guest id
pub const MIN_CONTAINER_ID: u32 = 100;

/// Largest Proxmox guest id
pub const MAX_CONTAINER_ID: u32 = 999_999_999;

/// The host itself or one of its containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Host,
    Container(u32),
}

impl From<Option<u32>> for Location {
    fn from(container_id: Option<u32>) -> Self {
        match container_id {
            Some(id) => Location::Container(id),
            None => Location::Host,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => f.write_str("on host"),
            Location::Container(id) => write!(f, "in container {}", id),
        }
    }
}

/// `test -f`, wrapped in `pct exec` for containers
pub fn exists_command(location: Location, path: &str) -> String {
    match location {
        Location::Host => format!("test -f {}", quote_for_shell(path)),
        Location::Container(id) => {
            format!("pct exec {} -- test -f {}", id, quote_for_shell(path))
        }
    }
}

/// Copy a host file into the container
pub fn push_command(container_id: u32, host_path: &str, container_path: &str) -> String {
    format!(
        "pct push {} {} {}",
        container_id,
        quote_for_shell(host_path),
        quote_for_shell(container_path)
    )
}

/// Copy a container file onto the host
pub fn pull_command(container_id: u32, container_path: &str, host_path: &str) -> String {
    format!(
        "pct pull {} {} {}",
        container_id,
        quote_for_shell(container_path),
        quote_for_shell(host_path)
    )
}

/// `permissions` is already validated octal digits (`644`)
pub fn chmod_command(container_id: u32, permissions: u32, path: &str) -> String {
    format!(
        "pct exec {} -- chmod {} {}",
        container_id,
        permissions,
        quote_for_shell(path)
    )
}

/// Run `script` through `bash -c` inside the container
pub fn container_exec_command(container_id: u32, script: &str) -> String {
    format!(
        "pct exec {} -- bash -c {}",
        container_id,
        quote_for_shell(script)
    )
}

pub fn list_command() -> &'static str {
    "pct list"
}

pub fn status_command(container_id: u32) -> String {
    format!("pct status {}", container_id)
}

pub fn start_command(container_id: u32) -> String {
    format!("pct start {}", container_id)
}

pub fn stop_command(container_id: u32) -> String {
    format!("pct stop {}", container_id)
}

/// `pct` reports an unknown guest as a missing configuration file
pub fn is_missing_container(stderr: &str) -> bool {
    stderr.contains(".conf' does not exist")
}

pub fn remove_command(path: &str) -> String {
    format!("rm -f {}", quote_for_shell(path))
}

/// Host staging path for an upload headed into a container
pub fn host_upload_temp(transfer_id: &str) -> String {
    format!("/tmp/mcp-relay-upload-{}", transfer_id)
}

/// Host staging path for a file pulled out of a container
pub fn host_download_temp(transfer_id: &str) -> String {
    format!("/tmp/mcp-relay-download-{}", transfer_id)
}
