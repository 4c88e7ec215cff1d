//! Command execution over SSH
//!
//! Provides the `CommandOutput` struct and `exec_command` functionality
//! for executing commands over an SSH connection with timeout support.

use std::time::Duration;

use async_trait::async_trait;
use russh::ChannelMsg;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::connection::SshConnectionManager;
use super::sanitize::escape_for_shell;
use crate::error::{RelayError, Result};
use crate::relay::RemoteExecutor;

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,

    /// Standard error from the command
    pub stderr: String,

    /// Exit code of the command (if available)
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Output of a command that exited with `code`
    pub fn with_exit_code(code: u32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// Check if the command succeeded (exit code 0 or no exit code available)
    pub fn success(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Best single-line explanation of a failure
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "no output".to_string(),
        }
    }
}

impl SshConnectionManager {
    /// Execute a command over SSH
    ///
    /// This method:
    /// 1. Ensures the connection is active
    /// 2. Opens a new exec channel
    /// 3. Collects stdout/stderr with timeout
    /// 4. On timeout, attempts graceful abort via pkill
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - Command output with stdout, stderr, and exit code
    /// * `Err(RelayError::Timeout)` - If command times out
    /// * `Err(RelayError::Connection)` - If connection issues occur
    pub async fn exec_command(
        &self,
        command: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput> {
        self.ensure_connected().await?;

        let channel = self.open_channel().await?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| RelayError::connection(format!("Failed to exec command: {}", e)))?;

        let result = timeout(timeout_duration, self.collect_channel_output(channel)).await;

        match result {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    "Command timed out after {}ms, attempting abort",
                    timeout_duration.as_millis()
                );
                self.abort_command(command).await;
                Err(RelayError::Timeout(timeout_duration.as_millis() as u64))
            }
        }
    }

    /// Collect output from a channel until it closes
    async fn collect_channel_output(
        &self,
        mut channel: russh::Channel<russh::client::Msg>,
    ) -> Result<CommandOutput> {
        let mut output = CommandOutput::new();

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    output.stdout.push_str(&String::from_utf8_lossy(&data));
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    // ext == 1 is stderr
                    if ext == 1 {
                        output.stderr.push_str(&String::from_utf8_lossy(&data));
                    } else {
                        output.stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.exit_code = Some(exit_status);
                }
                ChannelMsg::Close | ChannelMsg::Eof => {
                    break;
                }
                _ => {}
            }
        }

        debug!(
            "Command completed: exit_code={:?}, stdout_len={}, stderr_len={}",
            output.exit_code,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(output)
    }

    /// Attempt to abort a running command by killing matching processes
    ///
    /// Sends `timeout 3s pkill -f 'command' 2>/dev/null || true`.
    async fn abort_command(&self, command: &str) {
        let channel = match self.open_channel().await {
            Ok(ch) => ch,
            Err(e) => {
                error!("Failed to open channel for abort: {}", e);
                return;
            }
        };

        let abort_cmd = format!(
            "timeout 3s pkill -f '{}' 2>/dev/null || true",
            escape_for_shell(command)
        );

        debug!("Sending abort command: {}", abort_cmd);

        if let Err(e) = channel.exec(true, abort_cmd.as_str()).await {
            error!("Failed to exec abort command: {}", e);
            return;
        }

        let _ = timeout(Duration::from_secs(5), async {
            let mut channel = channel;
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Close | ChannelMsg::Eof => break,
                    _ => continue,
                }
            }
        })
        .await;

        debug!("Abort command completed");
    }
}

#[async_trait]
impl RemoteExecutor for SshConnectionManager {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.exec_command(command, timeout).await
    }
}
