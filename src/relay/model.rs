//! Response payloads returned by the transfer tools

use serde::Serialize;

/// Reply to `request_upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTicket {
    pub transfer_id: String,

    /// Client-side command; `<YOUR_FILE_PATH>` marks the local file
    pub upload_command: String,

    /// Seconds until the transfer expires
    pub expires_in: u64,
}

/// Reply to `request_download`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTicket {
    pub transfer_id: String,
    pub download_url: String,
    pub download_command: String,
    pub expires_in: u64,
}

/// Reply to either confirm operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferConfirmation {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_transferred: Option<u64>,
}

/// Reply to a direct copy between the relay machine and the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub success: bool,
    pub message: String,
    pub local_path: String,
    pub remote_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<u32>,

    /// Mode applied after an upload, as octal digits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,

    pub bytes_transferred: u64,
}
