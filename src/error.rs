//! Error types for the SSH relay MCP server

use thiserror::Error;

/// Infrastructure error raised by the SSH, SFTP and storage collaborators
#[derive(Debug, Error)]
pub enum RelayError {
    /// SSH connection failed
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Authentication failed (password or key)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Command execution timed out
    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH key parsing error
    #[error("SSH key error: {0}")]
    SshKey(String),

    /// Remote command ran but reported failure
    #[error("Remote command failed: {0}")]
    Command(String),

    /// SFTP session or transfer failure
    #[error("SFTP error: {0}")]
    Sftp(String),

    /// Object storage API rejected a request
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP transport failure talking to object storage
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        RelayError::Connection(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        RelayError::Authentication(msg.into())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        RelayError::InvalidParams(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create a remote command error from a string
    pub fn command(msg: impl Into<String>) -> Self {
        RelayError::Command(msg.into())
    }

    /// Create an SFTP error from a string
    pub fn sftp(msg: impl Into<String>) -> Self {
        RelayError::Sftp(msg.into())
    }

    /// Create a storage error from a string
    pub fn storage(msg: impl Into<String>) -> Self {
        RelayError::Storage(msg.into())
    }
}
