//! Optional relay features switched on at startup

use std::collections::HashSet;
use std::fmt;

use super::error::TransferError;

/// A feature the operator must opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Route transfers into Proxmox containers with `pct`
    Containers,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Containers => "containers",
        }
    }

    /// How an operator turns the capability on
    pub fn enable_hint(&self) -> &'static str {
        match self {
            Capability::Containers => {
                "Start the server with --enable-containers or set SSH_MCP_ENABLE_CONTAINERS=true"
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities enabled for this server
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet(HashSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.enable(capability);
        self
    }

    pub fn enable(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Fail with [`TransferError::CapabilityUnavailable`] unless enabled
    pub fn require(&self, capability: Capability) -> Result<(), TransferError> {
        if self.is_enabled(capability) {
            Ok(())
        } else {
            Err(TransferError::CapabilityUnavailable(capability))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_rejects_containers() {
        let set = CapabilitySet::new();
        assert!(!set.is_enabled(Capability::Containers));
        let err = set.require(Capability::Containers).unwrap_err();
        assert!(err.to_string().contains("containers"));
        assert!(err.suggestion().unwrap().contains("--enable-containers"));
    }

    #[test]
    fn test_enabled_capability() {
        let set = CapabilitySet::new().with(Capability::Containers);
        assert!(set.is_enabled(Capability::Containers));
        assert!(set.require(Capability::Containers).is_ok());
    }
}
