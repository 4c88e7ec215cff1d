//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to handle SSH connection events.

use russh::keys::HashAlg;
use tracing::debug;

/// SSH client handler for russh
///
/// Accepts every server key and records its fingerprint in the debug log.
#[derive(Debug, Clone)]
pub struct SshHandler {
    host: String,
}

impl SshHandler {
    /// Create a handler for connections to `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Host this handler verifies keys for
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl russh::client::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting {} host key {} for {}",
            server_public_key.algorithm(),
            server_public_key.fingerprint(HashAlg::Sha256),
            self.host
        );
        Ok(true)
    }
}
