//! Remote host collaborators used by the relay
//!
//! The orchestrator only sees the host through these two traits, which the
//! SSH connection manager implements and tests replace with in-memory fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ssh::CommandOutput;

/// Runs a shell command on the remote host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute `command`, giving up after `timeout`
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

/// Outcome of a successful file copy between the relay and the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Bytes moved
    pub bytes: u64,

    /// Human-readable summary
    pub message: String,
}

/// Copies whole files between the relay and the remote host
#[async_trait]
pub trait FileCopier: Send + Sync {
    /// Copy a relay-local file to `remote_path`
    ///
    /// `permissions` uses octal digits written as a decimal number (`644`).
    async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
        permissions: Option<u32>,
        overwrite: bool,
    ) -> Result<CopyOutcome>;

    /// Copy `remote_path` into a relay-local file
    async fn get(&self, remote_path: &str, local_path: &Path, overwrite: bool)
        -> Result<CopyOutcome>;
}
