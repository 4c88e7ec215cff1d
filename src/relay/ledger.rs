//! In-memory registry of in-flight transfers

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Which way the bytes flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Client to remote host
    Upload,
    /// Remote host to client
    Download,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "upload",
            TransferDirection::Download => "download",
        }
    }

    /// Name with its indefinite article ("an upload")
    pub fn with_article(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "an upload",
            TransferDirection::Download => "a download",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller choices recorded with a transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Octal mode written as decimal digits (`644`)
    pub permissions: Option<u32>,

    /// Replace an existing destination file
    pub overwrite: bool,

    /// Route through this container instead of the host
    pub container_id: Option<u32>,
}

/// One in-flight transfer
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: String,
    pub direction: TransferDirection,

    /// Sink for uploads, source for downloads
    pub destination_path: String,

    /// Set once the object is placed in storage (downloads)
    pub storage_object_id: Option<String>,

    pub created_at: Instant,
    pub permissions: Option<u32>,
    pub overwrite: bool,
    pub container_id: Option<u32>,
}

impl TransferRecord {
    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > timeout
    }
}

/// Owns every [`TransferRecord`]
///
/// Records disappear when completed or once older than the ledger timeout.
/// Expired records are invisible to lookups even before a sweep removes them.
#[derive(Debug)]
pub struct TransferLedger {
    timeout: Duration,
    records: Mutex<HashMap<String, TransferRecord>>,
}

impl TransferLedger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Expiry window applied to every record
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new transfer under a fresh id
    pub async fn create(
        &self,
        direction: TransferDirection,
        destination_path: &str,
        options: TransferOptions,
    ) -> TransferRecord {
        let mut records = self.records.lock().await;

        let mut id = Uuid::new_v4().to_string();
        while records.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let record = TransferRecord {
            id: id.clone(),
            direction,
            destination_path: destination_path.to_string(),
            storage_object_id: None,
            created_at: Instant::now(),
            permissions: options.permissions,
            overwrite: options.overwrite,
            container_id: options.container_id,
        };
        records.insert(id, record.clone());

        debug!(
            "Created {} transfer {} for {}",
            direction, record.id, record.destination_path
        );
        record
    }

    /// Look up a live transfer
    pub async fn get(&self, id: &str) -> Option<TransferRecord> {
        let records = self.records.lock().await;
        records
            .get(id)
            .filter(|r| !r.is_expired(Instant::now(), self.timeout))
            .cloned()
    }

    /// Record where the transfer's object lives in storage
    pub async fn attach_storage_object(&self, id: &str, object_id: &str) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(id) {
            Some(record) => {
                record.storage_object_id = Some(object_id.to_string());
                debug!("Attached storage object {} to transfer {}", object_id, id);
                true
            }
            None => false,
        }
    }

    /// Remove and return a live transfer
    ///
    /// At most one caller receives the record.
    pub async fn complete(&self, id: &str) -> Option<TransferRecord> {
        let mut records = self.records.lock().await;
        let record = records.remove(id)?;
        if record.is_expired(Instant::now(), self.timeout) {
            debug!("Transfer {} expired before completion", id);
            return None;
        }
        debug!("Completed transfer {}", id);
        Some(record)
    }

    /// Drop every record older than the timeout, returning how many went
    pub async fn sweep_expired(&self, now: Instant) -> usize {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now, self.timeout));
        let removed = before - records.len();
        if removed > 0 {
            info!("Cleaned up {} expired transfer(s)", removed);
        }
        removed
    }

    pub async fn active_count(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Forget every transfer
    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}
