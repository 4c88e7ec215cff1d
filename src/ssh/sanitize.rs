//! Command, path and permission sanitization
//!
//! Provides functions for validating and escaping values before they are
//! interpolated into commands executed over SSH or handed to SFTP.

use std::path::{Component, Path};

use crate::error::{RelayError, Result};

/// Longest remote path accepted by the transfer tools
pub const MAX_PATH_LEN: usize = 4096;

/// Largest permission value accepted (`rwxrwxrwx`)
pub const MAX_PERMISSIONS: u32 = 777;

/// Sanitize a command before execution
///
/// This function:
/// - Validates that the command is not empty
/// - Trims whitespace
/// - Checks length against max_chars limit
///
/// # Examples
/// ```
/// use ssh_relay_mcp::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  ls -la  ", Some(1000)).unwrap();
/// assert_eq!(cmd, "ls -la");
///
/// let result = sanitize_command("a".repeat(100).as_str(), Some(50));
/// assert!(result.is_err());
/// ```
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(RelayError::invalid_params("Command cannot be empty"));
    }

    if let Some(max) = max_chars {
        if trimmed.len() > max {
            return Err(RelayError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max,
                trimmed.len()
            )));
        }
    }

    Ok(trimmed.to_string())
}

/// Escape a string for use inside a single-quoted shell word
///
/// `'word'` becomes `'"'"'word'"'"'`: end quote, literal quote via double
/// quotes, start quote again.
///
/// # Example
/// ```
/// use ssh_relay_mcp::ssh::sanitize::escape_for_shell;
///
/// assert_eq!(escape_for_shell("it's"), "it'\"'\"'s");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Render `s` as one single-quoted shell word
///
/// ```
/// use ssh_relay_mcp::ssh::sanitize::quote_for_shell;
///
/// assert_eq!(quote_for_shell("/tmp/a b"), "'/tmp/a b'");
/// ```
pub fn quote_for_shell(s: &str) -> String {
    format!("'{}'", escape_for_shell(s))
}

/// Validate a remote path handed to a transfer
///
/// Rejects empty or whitespace-only paths, paths longer than
/// [`MAX_PATH_LEN`], and any path containing a `..` component.
pub fn validate_remote_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(RelayError::invalid_params("Path cannot be empty"));
    }

    if path.len() > MAX_PATH_LEN {
        return Err(RelayError::invalid_params(format!(
            "Path is too long (max {} characters, got {})",
            MAX_PATH_LEN,
            path.len()
        )));
    }

    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(RelayError::invalid_params(
            "Path cannot contain '..' (path traversal not allowed)",
        ));
    }

    Ok(())
}

/// Validate a permission value written in octal notation as a decimal number
///
/// `644` is accepted, `648` and `1000` are not.
pub fn validate_permissions(permissions: u32) -> Result<()> {
    let digits = permissions.to_string();
    if permissions > MAX_PERMISSIONS || !digits.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(RelayError::invalid_params(format!(
            "Invalid octal permission value: {}. Each digit must be 0-7. \
             Common values: 644 (rw-r--r--), 755 (rwxr-xr-x), 600 (rw-------), 700 (rwx------)",
            permissions
        )));
    }
    Ok(())
}

/// Convert a permission value such as `644` into its file mode (`0o644`)
pub fn octal_mode(permissions: u32) -> Result<u32> {
    validate_permissions(permissions)?;
    u32::from_str_radix(&permissions.to_string(), 8)
        .map_err(|e| RelayError::invalid_params(format!("Invalid permission value: {}", e)))
}
