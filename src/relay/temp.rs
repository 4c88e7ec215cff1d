//! Scoped temporary files on the relay and on the remote host
//!
//! Release never fails: problems are logged and swallowed.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use super::container::{remove_command, CLEANUP_TIMEOUT};
use super::remote::RemoteExecutor;
use crate::error::Result;

/// Relay-local temp file, removed on [`release`](Self::release) or drop
#[derive(Debug)]
pub struct LocalTempFile {
    path: PathBuf,
    guard: Option<TempPath>,
}

impl LocalTempFile {
    /// Create an empty file in the system temp directory
    pub fn new(prefix: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".tmp")
            .tempfile()?;
        let guard = file.into_temp_path();
        Ok(Self {
            path: guard.to_path_buf(),
            guard: Some(guard),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(guard) = self.guard.take() {
            match guard.close() {
                Ok(()) => debug!("Removed local temp file {}", self.path.display()),
                Err(e) => warn!(
                    "Failed to remove local temp file {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for LocalTempFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Staging file on the remote host, removed with `rm -f`
#[derive(Debug)]
#[must_use = "host temp files must be released explicitly"]
pub struct HostTempFile {
    path: String,
}

impl HostTempFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn release(self, remote: &dyn RemoteExecutor) {
        match remote
            .execute(&remove_command(&self.path), CLEANUP_TIMEOUT)
            .await
        {
            Ok(output) if output.success() => debug!("Removed host temp file {}", self.path),
            Ok(output) => warn!(
                "Failed to remove host temp file {}: {}",
                self.path,
                output.failure_detail()
            ),
            Err(e) => warn!("Failed to remove host temp file {}: {}", self.path, e),
        }
    }
}
