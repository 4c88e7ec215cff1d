//! Two-phase transfer protocol between client, storage, host and containers
//!
//! Uploads: `request_upload` hands the client a signed storage upload
//! command, `confirm_upload` pulls the object down to the relay and delivers
//! it to the host (or through a host staging file into a container).
//!
//! Downloads: `request_download` stages the file on the relay, publishes it
//! to storage and returns its URL; `confirm_download` deletes the object.
//!
//! Every temp file created along the way is released on both success and
//! failure paths.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::capability::{Capability, CapabilitySet};
use super::container::{host_download_temp, host_upload_temp, Location};
use super::error::{TransferError, TransferResult};
use super::ledger::{TransferDirection, TransferLedger, TransferOptions, TransferRecord};
use super::model::{DownloadTicket, TransferConfirmation, UploadTicket};
use super::remote::{FileCopier, RemoteExecutor};
use super::staging::{check_exists, pull_from_container, push_into_container};
use super::temp::{HostTempFile, LocalTempFile};
use crate::ssh::{validate_permissions, validate_remote_path};
use crate::storage::{ObjectStore, LOCAL_FILE_PLACEHOLDER};

/// Storage object name a client upload must use
pub fn upload_object_name(transfer_id: &str) -> String {
    format!("mcp-upload-{}", transfer_id)
}

/// Storage object name a published download is stored under
pub fn download_object_name(transfer_id: &str) -> String {
    format!("mcp-download-{}", transfer_id)
}

/// Drives transfers through the ledger and the three collaborators
pub struct RelayOrchestrator {
    ledger: TransferLedger,
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn RemoteExecutor>,
    files: Arc<dyn FileCopier>,
    capabilities: CapabilitySet,
}

impl RelayOrchestrator {
    pub fn new(
        ledger: TransferLedger,
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn RemoteExecutor>,
        files: Arc<dyn FileCopier>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            ledger,
            store,
            remote,
            files,
            capabilities,
        }
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Open an upload and return the client's upload command
    pub async fn request_upload(
        &self,
        destination_path: &str,
        options: TransferOptions,
    ) -> TransferResult<UploadTicket> {
        let location = self.check_target(destination_path, options.container_id)?;
        if let Some(permissions) = options.permissions {
            validate_permissions(permissions).map_err(TransferError::validation)?;
        }

        if !options.overwrite {
            match check_exists(self.remote.as_ref(), location, destination_path).await {
                Ok(true) => {
                    return Err(TransferError::Conflict {
                        path: destination_path.to_string(),
                        location,
                    })
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "Could not check whether {} exists {}, continuing: {}",
                    destination_path, location, e
                ),
            }
        }

        let record = self
            .ledger
            .create(TransferDirection::Upload, destination_path, options)
            .await;

        let object_name = upload_object_name(&record.id);
        let upload_command = match self.store.build_client_upload_command(&object_name).await {
            Ok(command) => command,
            Err(e) => {
                error!("Failed to issue upload credentials for {}: {}", record.id, e);
                self.ledger.complete(&record.id).await;
                return Err(TransferError::storage("Failed to generate upload credentials", e));
            }
        };

        self.sweep().await;

        info!(
            "Upload {} requested for {} {}",
            record.id, destination_path, location
        );
        Ok(UploadTicket {
            transfer_id: record.id,
            upload_command,
            expires_in: self.ledger.timeout().as_secs(),
        })
    }

    /// Deliver an uploaded object to its destination
    ///
    /// Without `object_id` the object is looked up by its expected name.
    pub async fn confirm_upload(
        &self,
        transfer_id: &str,
        object_id: Option<&str>,
    ) -> TransferResult<TransferConfirmation> {
        let record = self
            .ledger
            .get(transfer_id)
            .await
            .ok_or_else(TransferError::expired)?;
        if record.direction != TransferDirection::Upload {
            return Err(TransferError::WrongOperation {
                id: record.id,
                expected: TransferDirection::Upload,
            });
        }

        let object_id = match object_id {
            Some(id) => id.to_string(),
            None => {
                let object_name = upload_object_name(&record.id);
                self.store
                    .find_by_name(&object_name)
                    .await
                    .map(|object| object.object_id)
                    .ok_or(TransferError::ObjectNotFound(object_name))?
            }
        };

        let local = LocalTempFile::new("mcp-upload-")
            .map_err(|e| TransferError::storage("Failed to create local temp file", e))?;
        let fetched = self
            .store
            .download_to(&object_id, local.path())
            .await
            .map_err(|e| TransferError::storage("Failed to download file from storage", e))?;
        debug!("Fetched {} bytes of {} from storage", fetched, object_id);

        // Consumed from here on, whatever happens next.
        let Some(record) = self.ledger.complete(transfer_id).await else {
            local.release();
            return Err(TransferError::already_completed());
        };

        let delivered = match record.container_id {
            Some(container_id) => self.deliver_to_container(&record, container_id, local).await,
            None => self.deliver_to_host(&record, local).await,
        };

        if !self.store.delete(&object_id).await {
            warn!("Storage object {} was not deleted", object_id);
        }

        let bytes = delivered?;
        let location = Location::from(record.container_id);
        info!(
            "Upload {} delivered {} bytes to {} {}",
            record.id, bytes, record.destination_path, location
        );
        Ok(TransferConfirmation {
            success: true,
            message: format!(
                "File uploaded successfully to {} {}",
                record.destination_path, location
            ),
            destination_path: Some(record.destination_path),
            bytes_transferred: Some(bytes),
        })
    }

    /// Publish a host or container file to storage
    pub async fn request_download(
        &self,
        source_path: &str,
        container_id: Option<u32>,
    ) -> TransferResult<DownloadTicket> {
        let location = self.check_target(source_path, container_id)?;

        if !check_exists(self.remote.as_ref(), location, source_path).await? {
            return Err(TransferError::SourceNotFound {
                path: source_path.to_string(),
                location,
            });
        }

        let options = TransferOptions {
            container_id,
            ..TransferOptions::default()
        };
        let record = self
            .ledger
            .create(TransferDirection::Download, source_path, options)
            .await;

        match self.publish(&record).await {
            Ok(ticket) => {
                self.sweep().await;
                info!("Download {} ready for {} {}", record.id, source_path, location);
                Ok(ticket)
            }
            Err(e) => {
                error!("Download {} failed: {}", record.id, e);
                self.ledger.complete(&record.id).await;
                Err(e)
            }
        }
    }

    /// Finish a download and remove its storage object
    pub async fn confirm_download(
        &self,
        transfer_id: &str,
    ) -> TransferResult<TransferConfirmation> {
        let record = self
            .ledger
            .get(transfer_id)
            .await
            .ok_or_else(TransferError::already_completed)?;
        if record.direction != TransferDirection::Download {
            return Err(TransferError::WrongOperation {
                id: record.id,
                expected: TransferDirection::Download,
            });
        }

        let record = self
            .ledger
            .complete(transfer_id)
            .await
            .ok_or_else(TransferError::already_completed)?;

        if let Some(object_id) = &record.storage_object_id {
            if !self.store.delete(object_id).await {
                warn!("Storage object {} was not deleted", object_id);
            }
        }

        info!("Download {} confirmed", record.id);
        Ok(TransferConfirmation {
            success: true,
            message: "Download confirmed and cleaned up".to_string(),
            destination_path: None,
            bytes_transferred: None,
        })
    }

    /// Capability gate then path validation
    fn check_target(&self, path: &str, container_id: Option<u32>) -> TransferResult<Location> {
        if container_id.is_some() {
            self.capabilities.require(Capability::Containers)?;
        }
        validate_remote_path(path).map_err(TransferError::validation)?;
        Ok(Location::from(container_id))
    }

    async fn deliver_to_host(
        &self,
        record: &TransferRecord,
        local: LocalTempFile,
    ) -> TransferResult<u64> {
        let copied = self
            .files
            .put(
                local.path(),
                &record.destination_path,
                record.permissions,
                record.overwrite,
            )
            .await;
        local.release();

        copied.map(|outcome| outcome.bytes).map_err(|e| {
            TransferError::remote(
                format!("Failed to copy file to {}", record.destination_path),
                e,
            )
        })
    }

    async fn deliver_to_container(
        &self,
        record: &TransferRecord,
        container_id: u32,
        local: LocalTempFile,
    ) -> TransferResult<u64> {
        let staging = HostTempFile::new(host_upload_temp(&record.id));
        let pushed = push_into_container(
            self.remote.as_ref(),
            self.files.as_ref(),
            local.path(),
            &staging,
            container_id,
            &record.destination_path,
            record.permissions,
        )
        .await;

        local.release();
        staging.release(self.remote.as_ref()).await;
        pushed
    }

    /// Stage the source on the relay and upload it to storage
    async fn publish(&self, record: &TransferRecord) -> TransferResult<DownloadTicket> {
        let staging = match record.container_id {
            Some(container_id) => Some(
                pull_from_container(
                    self.remote.as_ref(),
                    container_id,
                    &record.destination_path,
                    HostTempFile::new(host_download_temp(&record.id)),
                )
                .await?,
            ),
            None => None,
        };
        let host_source = staging
            .as_ref()
            .map_or(record.destination_path.as_str(), HostTempFile::path)
            .to_string();

        let fetched = match LocalTempFile::new("mcp-download-") {
            Ok(local) => self
                .files
                .get(&host_source, local.path(), true)
                .await
                .map(|outcome| (local, outcome)),
            Err(e) => Err(e),
        };
        if let Some(staging) = staging {
            staging.release(self.remote.as_ref()).await;
        }
        let (local, copied) = fetched.map_err(|e| {
            TransferError::remote(format!("Failed to copy {} from host", host_source), e)
        })?;
        debug!("Staged {} bytes from {}", copied.bytes, host_source);

        let object_name = download_object_name(&record.id);
        let uploaded = self.store.upload_from(local.path(), &object_name).await;
        local.release();
        let stored =
            uploaded.map_err(|e| TransferError::storage("Failed to upload file to storage", e))?;

        if !self
            .ledger
            .attach_storage_object(&record.id, &stored.object_id)
            .await
        {
            self.store.delete(&stored.object_id).await;
            return Err(TransferError::expired());
        }

        Ok(DownloadTicket {
            transfer_id: record.id.clone(),
            download_command: format!("curl -o '{}' '{}'", LOCAL_FILE_PLACEHOLDER, stored.url),
            download_url: stored.url,
            expires_in: self.ledger.timeout().as_secs(),
        })
    }

    async fn sweep(&self) {
        self.ledger.sweep_expired(Instant::now()).await;
    }
}
