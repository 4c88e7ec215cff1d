//! Object storage used as the relay's hand-off point
//!
//! Clients never talk to the remote host directly: uploads land in object
//! storage first and downloads are published there. [`ObjectStore`] is the
//! seam the relay depends on; [`ImageKitGateway`] is the production backend.

pub mod imagekit;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use imagekit::ImageKitGateway;

/// Placeholder the client replaces with its local file path
pub const LOCAL_FILE_PLACEHOLDER: &str = "<YOUR_FILE_PATH>";

/// Time-boxed credentials a client presents to upload one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadCredentials {
    /// One-time token
    pub token: String,

    /// UNIX timestamp (seconds) after which the credentials are rejected
    pub expire: u64,

    /// Signature over token and expiry
    pub signature: String,

    /// Public key identifying the storage account
    pub public_key: String,

    /// Object name the credentials are meant for
    pub object_name: String,
}

/// An object that exists in storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Storage-assigned identifier
    pub object_id: String,

    /// Retrieval URL
    pub url: String,

    /// Object name
    pub name: String,
}

/// Storage operations the relay needs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue client-presentable upload credentials scoped to `object_name`
    async fn issue_upload_credentials(&self, object_name: &str) -> Result<UploadCredentials>;

    /// Render a ready-to-run client upload command
    ///
    /// The command contains [`LOCAL_FILE_PLACEHOLDER`] where the client's
    /// file path goes.
    async fn build_client_upload_command(&self, object_name: &str) -> Result<String>;

    /// Resolve a direct retrieval URL for an object
    async fn fetch_object_url(&self, object_id: &str) -> Result<String>;

    /// Pull an object into `local_path`, returning the bytes written
    async fn download_to(&self, object_id: &str, local_path: &Path) -> Result<u64>;

    /// Push `local_path` into storage under `object_name`
    async fn upload_from(&self, local_path: &Path, object_name: &str) -> Result<StoredObject>;

    /// Best-effort lookup by name; errors are logged and reported as absent
    async fn find_by_name(&self, object_name: &str) -> Option<StoredObject>;

    /// Best-effort removal; returns false (after logging) on failure
    async fn delete(&self, object_id: &str) -> bool;
}
