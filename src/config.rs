//! Configuration and CLI argument parsing for the SSH relay MCP server

use clap::Parser;
use std::path::PathBuf;

use crate::error::{RelayError, Result};

/// Default timeout for command execution in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000; // 60 seconds

/// Default max characters for command length (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = Some(1000);

/// Connection timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Largest file the SFTP copy will move in either direction (10MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// How long an unconfirmed transfer stays in the ledger (1 hour)
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 3600;

/// Storage folder that holds relay objects
pub const DEFAULT_STORAGE_FOLDER: &str = "/mcp-remote-exec";

/// SSH relay MCP server CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ssh-relay-mcp")]
#[command(version)]
#[command(
    about = "MCP server exposing SSH command execution and an object-storage file relay"
)]
pub struct Args {
    /// SSH host to connect to
    #[arg(long, env = "SSH_MCP_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, default_value = "22", env = "SSH_MCP_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, env = "SSH_MCP_USER")]
    pub user: String,

    /// SSH password (alternative to key)
    #[arg(long, env = "SSH_MCP_PASSWORD")]
    pub password: Option<String>,

    /// Path to SSH private key file (alternative to password)
    #[arg(long, env = "SSH_MCP_KEY")]
    pub key: Option<PathBuf>,

    /// Command execution timeout in milliseconds
    #[arg(long, default_value = "60000", env = "SSH_MCP_TIMEOUT")]
    pub timeout: u64,

    /// Maximum characters for command length.
    /// Use "none", "0", or negative value to disable limit.
    /// Default: 1000
    #[arg(long = "maxChars", env = "SSH_MCP_MAX_CHARS")]
    pub max_chars: Option<String>,

    /// Maximum size in bytes of a file moved over SFTP
    #[arg(long, default_value = "10485760", env = "SSH_MCP_MAX_FILE_SIZE")]
    pub max_file_size: u64,

    /// Allow transfers addressed to Proxmox containers (container_id parameter)
    #[arg(long, default_value = "false", env = "SSH_MCP_ENABLE_CONTAINERS")]
    pub enable_containers: bool,

    /// ImageKit public key
    #[arg(long, env = "IMAGEKIT_PUBLIC_KEY")]
    pub imagekit_public_key: Option<String>,

    /// ImageKit private key
    #[arg(long, env = "IMAGEKIT_PRIVATE_KEY")]
    pub imagekit_private_key: Option<String>,

    /// ImageKit URL endpoint
    #[arg(long, env = "IMAGEKIT_URL_ENDPOINT")]
    pub imagekit_url_endpoint: Option<String>,

    /// ImageKit folder used for relay objects
    #[arg(long, default_value = DEFAULT_STORAGE_FOLDER, env = "IMAGEKIT_FOLDER")]
    pub imagekit_folder: String,

    /// Seconds before an unconfirmed transfer expires
    #[arg(long, default_value = "3600", env = "IMAGEKIT_TRANSFER_TIMEOUT")]
    pub transfer_timeout: u64,
}

/// Object storage settings; present only when every credential is set
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// ImageKit public key
    pub public_key: String,

    /// ImageKit private key
    pub private_key: String,

    /// ImageKit URL endpoint
    pub url_endpoint: String,

    /// Folder that holds relay objects
    pub folder: String,

    /// Transfer expiry window in seconds
    pub transfer_timeout_secs: u64,

    /// Largest object fetched from storage, in bytes
    pub max_object_size: u64,
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SSH host
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH username
    pub user: String,

    /// SSH password
    pub password: Option<String>,

    /// Path to SSH private key
    pub key: Option<PathBuf>,

    /// Command timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum command length (None = unlimited)
    pub max_chars: Option<usize>,

    /// Maximum SFTP transfer size in bytes
    pub max_file_size: u64,

    /// Whether container routing is enabled
    pub enable_containers: bool,

    /// Object storage for the file relay (None = relay tools disabled)
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        let max_chars = parse_max_chars(args.max_chars.as_deref());
        let storage = storage_config(&args);

        Ok(Config {
            host: args.host,
            port: args.port,
            user: args.user,
            password: sanitize_secret(args.password),
            key: args.key,
            timeout_ms: args.timeout,
            max_chars,
            max_file_size: args.max_file_size,
            enable_containers: args.enable_containers,
            storage,
        })
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    if args.host.is_empty() {
        errors.push("Missing required --host".to_string());
    }

    if args.user.is_empty() {
        errors.push("Missing required --user".to_string());
    }

    // Must have either password or key
    if args.password.is_none() && args.key.is_none() {
        errors.push("Must provide either --password or --key".to_string());
    }

    // If key is provided, check if file exists
    if let Some(ref key_path) = args.key {
        if !key_path.exists() {
            errors.push(format!("SSH key file not found: {}", key_path.display()));
        }
    }

    let credentials = [
        ("--imagekit-public-key", &args.imagekit_public_key),
        ("--imagekit-private-key", &args.imagekit_private_key),
        ("--imagekit-url-endpoint", &args.imagekit_url_endpoint),
    ];
    let provided = credentials
        .iter()
        .filter(|(_, value)| value.as_deref().is_some_and(|v| !v.is_empty()))
        .count();
    if provided > 0 && provided < credentials.len() {
        for (flag, value) in credentials {
            if value.as_deref().is_none_or(str::is_empty) {
                errors.push(format!("Missing {flag} (ImageKit credentials are all-or-nothing)"));
            }
        }
    }

    if args.transfer_timeout == 0 {
        errors.push("--transfer-timeout must be greater than 0".to_string());
    }

    if !errors.is_empty() {
        return Err(RelayError::Config(format!(
            "Configuration error:\n{}",
            errors.join("\n")
        )));
    }

    Ok(())
}

/// Build the storage section when all ImageKit credentials are present
fn storage_config(args: &Args) -> Option<StorageConfig> {
    let public_key = sanitize_secret(args.imagekit_public_key.clone())?;
    let private_key = sanitize_secret(args.imagekit_private_key.clone())?;
    let url_endpoint = sanitize_secret(args.imagekit_url_endpoint.clone())?;

    Some(StorageConfig {
        public_key,
        private_key,
        url_endpoint,
        folder: args.imagekit_folder.clone(),
        transfer_timeout_secs: args.transfer_timeout,
        max_object_size: args.max_file_size,
    })
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) → DEFAULT_MAX_CHARS
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    match value {
        None => DEFAULT_MAX_CHARS,
        Some(s) => {
            let lowered = s.to_lowercase();
            if lowered == "none" {
                return None;
            }

            match s.parse::<i64>() {
                Ok(n) if n <= 0 => None,
                Ok(n) => Some(n as usize),
                Err(_) => DEFAULT_MAX_CHARS,
            }
        }
    }
}

/// Treat empty secrets as unset
fn sanitize_secret(secret: Option<String>) -> Option<String> {
    secret.filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "ssh-relay-mcp",
            "--host",
            "10.0.0.5",
            "--user",
            "root",
            "--password",
            "secret",
        ]
    }

    #[test]
    fn test_parse_max_chars_none_string() {
        assert_eq!(parse_max_chars(Some("none")), None);
        assert_eq!(parse_max_chars(Some("None")), None);
        assert_eq!(parse_max_chars(Some("NONE")), None);
    }

    #[test]
    fn test_parse_max_chars_zero_or_negative() {
        assert_eq!(parse_max_chars(Some("0")), None);
        assert_eq!(parse_max_chars(Some("-1")), None);
    }

    #[test]
    fn test_parse_max_chars_positive() {
        assert_eq!(parse_max_chars(Some("500")), Some(500));
    }

    #[test]
    fn test_parse_max_chars_invalid() {
        assert_eq!(parse_max_chars(Some("abc")), DEFAULT_MAX_CHARS);
        assert_eq!(parse_max_chars(None), DEFAULT_MAX_CHARS);
    }

    #[test]
    fn test_sanitize_secret() {
        assert_eq!(
            sanitize_secret(Some("secret".to_string())),
            Some("secret".to_string())
        );
        assert_eq!(sanitize_secret(Some("".to_string())), None);
        assert_eq!(sanitize_secret(None), None);
    }

    #[test]
    fn test_defaults_without_storage() {
        let args = Args::try_parse_from(base_args()).unwrap();
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.port, 22);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(!config.enable_containers);
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_storage_enabled_with_all_credentials() {
        let mut argv = base_args();
        argv.extend([
            "--imagekit-public-key",
            "public_abc",
            "--imagekit-private-key",
            "private_abc",
            "--imagekit-url-endpoint",
            "https://ik.imagekit.io/demo",
            "--transfer-timeout",
            "600",
            "--enable-containers",
        ]);
        let config = Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap();

        let storage = config.storage.expect("storage configured");
        assert_eq!(storage.public_key, "public_abc");
        assert_eq!(storage.folder, DEFAULT_STORAGE_FOLDER);
        assert_eq!(storage.transfer_timeout_secs, 600);
        assert_eq!(storage.max_object_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.enable_containers);
    }

    #[test]
    fn test_partial_storage_credentials_rejected() {
        let mut argv = base_args();
        argv.extend(["--imagekit-public-key", "public_abc"]);
        let err = Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("--imagekit-private-key"));
        assert!(message.contains("--imagekit-url-endpoint"));
    }

    #[test]
    fn test_missing_auth_rejected() {
        let args =
            Args::try_parse_from(["ssh-relay-mcp", "--host", "h", "--user", "u"]).unwrap();
        let err = Config::from_args(args).unwrap_err();
        assert!(err.to_string().contains("--password or --key"));
    }

    #[test]
    fn test_zero_transfer_timeout_rejected() {
        let mut argv = base_args();
        argv.extend(["--transfer-timeout", "0"]);
        let err = Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap_err();
        assert!(err.to_string().contains("--transfer-timeout"));
    }
}
