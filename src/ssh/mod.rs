//! SSH connection management module
//!
//! This module provides persistent SSH connection handling with lazy
//! connection, authentication, command execution and SFTP file copy.

pub mod command;
pub mod config;
pub mod connection;
pub mod handler;
pub mod sanitize;
pub mod sftp;

// Re-exports
pub use command::CommandOutput;
pub use config::SshConfig;
pub use connection::SshConnectionManager;
pub use handler::SshHandler;
pub use sanitize::{
    escape_for_shell, octal_mode, quote_for_shell, sanitize_command, validate_permissions,
    validate_remote_path,
};
