//! SSH Relay MCP Server - Entry point
//!
//! Parses CLI arguments, validates configuration, starts the MCP server on
//! stdio transport, and handles graceful shutdown.

use clap::Parser;
use rmcp::service::ServiceExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ssh_relay_mcp::config::{Args, Config};
use ssh_relay_mcp::error::{RelayError, Result};
use ssh_relay_mcp::server::SshRelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    info!("SSH relay MCP server v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Connecting to {}@{}:{}",
        config.user, config.host, config.port
    );
    info!(
        "Timeout: {}ms, Max chars: {}, Max file size: {} bytes",
        config.timeout_ms,
        config
            .max_chars
            .map_or("unlimited".to_string(), |n| n.to_string()),
        config.max_file_size
    );

    match config.storage {
        Some(ref storage) => info!(
            "File relay enabled: ImageKit {} folder {}, transfers expire after {}s",
            storage.url_endpoint, storage.folder, storage.transfer_timeout_secs
        ),
        None => info!("File relay disabled (ImageKit credentials not set)"),
    }
    if config.enable_containers {
        info!("Container routing enabled");
    }

    let server = SshRelayServer::new(config).await?;

    info!("SSH relay MCP server running on stdio");

    let server_for_shutdown = server.clone();

    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = tokio::signal::unix::signal(
                        tokio::signal::unix::SignalKind::terminate()
                    ).expect("Failed to register SIGTERM handler");
                    sigterm.recv().await;
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, shutting down...");
            }
        }

        server_for_shutdown.shutdown().await;
    });

    match server.serve(rmcp::transport::io::stdio()).await {
        Ok(running_server) => {
            info!("MCP server is serving...");
            if let Err(e) = running_server.waiting().await {
                error!("Server error: {}", e);
            }
        }
        Err(e) => {
            error!("Failed to start MCP server: {}", e);
            return Err(RelayError::connection(e.to_string()));
        }
    }

    shutdown_handle.abort();

    info!("SSH relay MCP server stopped");

    Ok(())
}
