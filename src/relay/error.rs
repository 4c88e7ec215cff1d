//! Transfer failures reported back to the caller

use thiserror::Error;

use super::capability::Capability;
use super::container::Location;
use super::ledger::TransferDirection;
use crate::error::RelayError;

pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Why a relay operation did not complete
#[derive(Debug, Error)]
pub enum TransferError {
    /// Caller input rejected before anything ran
    #[error("{0}")]
    Validation(String),

    #[error("File already exists {location}: {path}")]
    Conflict { path: String, location: Location },

    /// The relay machine already has a file at the requested local path
    #[error("Local file already exists: {0}")]
    LocalConflict(String),

    #[error("Capability '{0}' is not enabled")]
    CapabilityUnavailable(Capability),

    /// Unknown, expired or already completed transfer id
    #[error("Transfer not found or {0}")]
    TransferNotFound(&'static str),

    #[error("Transfer {id} is not {} operation", .expected.with_article())]
    WrongOperation {
        id: String,
        expected: TransferDirection,
    },

    #[error("File not found {location}: {path}")]
    SourceNotFound { path: String, location: Location },

    #[error("Object not found in storage: {0}. Upload may not have completed")]
    ObjectNotFound(String),

    #[error("Container {0} not found")]
    ContainerNotFound(u32),

    /// A `pct` command failed
    #[error("{message}")]
    ContainerCommand { message: String },

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: RelayError,
    },

    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: RelayError,
    },
}

impl TransferError {
    /// Turn a collaborator validation failure into caller-facing text
    pub fn validation(err: RelayError) -> Self {
        match err {
            RelayError::InvalidParams(msg) => TransferError::Validation(msg),
            other => TransferError::Validation(other.to_string()),
        }
    }

    pub fn expired() -> Self {
        TransferError::TransferNotFound("expired")
    }

    pub fn already_completed() -> Self {
        TransferError::TransferNotFound("already completed")
    }

    pub fn container(message: impl Into<String>) -> Self {
        TransferError::ContainerCommand {
            message: message.into(),
        }
    }

    pub fn remote(context: impl Into<String>, source: RelayError) -> Self {
        TransferError::Remote {
            context: context.into(),
            source,
        }
    }

    pub fn storage(context: impl Into<String>, source: RelayError) -> Self {
        TransferError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Next step for the caller, when there is an obvious one
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            TransferError::Conflict { .. } | TransferError::LocalConflict(_) => {
                Some("Set overwrite=true to replace existing file")
            }
            TransferError::CapabilityUnavailable(capability) => Some(capability.enable_hint()),
            TransferError::TransferNotFound(_) => {
                Some("Start a new transfer with request_upload or request_download")
            }
            TransferError::ObjectNotFound(_) => Some(
                "Run the upload command before confirming, or pass object_id from the upload response",
            ),
            TransferError::ContainerNotFound(_) => {
                Some("Use proxmox_list_containers to see available containers")
            }
            TransferError::ContainerCommand { .. } => Some("Check if container exists and is running"),
            TransferError::SourceNotFound { .. } => Some("Check that the path exists and is a regular file"),
            TransferError::Validation(_)
            | TransferError::WrongOperation { .. }
            | TransferError::Remote { .. }
            | TransferError::Storage { .. } => None,
        }
    }
}
