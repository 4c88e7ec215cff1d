//! Two-phase file relay through object storage
//!
//! The relay moves files between an MCP client and the remote host (or a
//! container on it) without a direct connection between them. Object storage
//! is the hand-off point; the [`TransferLedger`] tracks each transfer from
//! its request to its confirmation.
//!
//! Without storage, [`DirectCopier`] moves files between the server's own
//! filesystem and the host in a single SFTP step.

pub mod capability;
pub mod container;
pub mod direct;
pub mod error;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod remote;
pub mod staging;
pub mod temp;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{Capability, CapabilitySet};
pub use container::Location;
pub use direct::DirectCopier;
pub use error::{TransferError, TransferResult};
pub use ledger::{TransferDirection, TransferLedger, TransferOptions, TransferRecord};
pub use model::{CopyReport, DownloadTicket, TransferConfirmation, UploadTicket};
pub use orchestrator::RelayOrchestrator;
pub use remote::{CopyOutcome, FileCopier, RemoteExecutor};
