//! ImageKit storage backend
//!
//! Async HTTP client for the ImageKit media API using `reqwest`. Server-side
//! calls authenticate with the private key (HTTP basic auth); client uploads
//! use HMAC-SHA1 signed one-time tokens so the private key never leaves the
//! relay.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::Sha1;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ObjectStore, StoredObject, UploadCredentials, LOCAL_FILE_PLACEHOLDER};
use crate::config::StorageConfig;
use crate::error::{RelayError, Result};

const DEFAULT_UPLOAD_URL: &str = "https://upload.imagekit.io/api/v1/files/upload";
const DEFAULT_API_BASE: &str = "https://api.imagekit.io/v1";

/// Lifetime of client upload credentials (ImageKit caps this at one hour)
const UPLOAD_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Results requested from the search endpoint
const SEARCH_LIMIT: usize = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

type HmacSha1 = Hmac<Sha1>;

/// File entry as returned by the upload and search endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    file_id: String,
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    file_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDetails {
    #[serde(default)]
    url: String,
    #[serde(default)]
    file_path: String,
}

/// Sign `token ++ expire` with the account's private key
pub fn sign_upload_token(private_key: &str, token: &str, expire: u64) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(private_key.as_bytes())
        .map_err(|e| RelayError::storage(format!("Invalid signing key: {}", e)))?;
    mac.update(token.as_bytes());
    mac.update(expire.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// ImageKit implementation of [`ObjectStore`]
pub struct ImageKitGateway {
    http: reqwest::Client,
    public_key: String,
    private_key: String,
    url_endpoint: String,
    folder: String,
    max_object_size: u64,
    upload_url: String,
    api_base: String,
}

impl ImageKitGateway {
    /// Create a gateway for the configured ImageKit account
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
            url_endpoint: config.url_endpoint.clone(),
            folder: config.folder.clone(),
            max_object_size: config.max_object_size,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the gateway at other endpoints (for testing).
    #[cfg(test)]
    pub(crate) fn with_base_urls(mut self, upload_url: String, api_base: String) -> Self {
        self.upload_url = upload_url;
        self.api_base = api_base;
        self
    }

    /// Delivery URL of an object; built from the endpoint when the API omits it
    fn object_url(&self, url: String, file_path: &str) -> String {
        if !url.is_empty() {
            return url;
        }
        format!(
            "{}/{}",
            self.url_endpoint.trim_end_matches('/'),
            file_path.trim_start_matches('/')
        )
    }

    fn stored(&self, entry: FileEntry) -> StoredObject {
        StoredObject {
            url: self.object_url(entry.url, &entry.file_path),
            object_id: entry.file_id,
            name: entry.name,
        }
    }

    fn too_large(&self, size: u64) -> RelayError {
        RelayError::storage(format!(
            "Object too large: {} bytes exceeds limit of {} bytes",
            size, self.max_object_size
        ))
    }

    /// Turn a non-2xx response into a storage error carrying the body
    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::storage(format!(
                "{} failed ({}): {}",
                what,
                status.as_u16(),
                body
            )));
        }
        Ok(resp)
    }

    async fn search(&self, object_name: &str) -> Result<Vec<FileEntry>> {
        let url = format!("{}/files", self.api_base);
        let query = [
            ("searchQuery", format!("name=\"{}\"", object_name)),
            ("path", self.folder.clone()),
            ("limit", SEARCH_LIMIT.to_string()),
        ];
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.private_key, Some(""))
            .query(&query)
            .send()
            .await?;
        let resp = Self::check(resp, "Search").await?;
        Ok(resp.json().await?)
    }
}

impl std::fmt::Debug for ImageKitGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageKitGateway")
            .field("public_key", &self.public_key)
            .field("url_endpoint", &self.url_endpoint)
            .field("folder", &self.folder)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for ImageKitGateway {
    async fn issue_upload_credentials(&self, object_name: &str) -> Result<UploadCredentials> {
        debug!("Generating upload token for {}", object_name);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RelayError::storage(format!("System clock before UNIX epoch: {}", e)))?;
        let expire = (now + UPLOAD_TOKEN_TTL).as_secs();
        let token = Uuid::new_v4().to_string();
        let signature = sign_upload_token(&self.private_key, &token, expire)?;

        Ok(UploadCredentials {
            token,
            expire,
            signature,
            public_key: self.public_key.clone(),
            object_name: object_name.to_string(),
        })
    }

    async fn build_client_upload_command(&self, object_name: &str) -> Result<String> {
        let auth = self.issue_upload_credentials(object_name).await?;

        Ok(format!(
            "curl -X POST '{upload_url}' \\\n  \
             -F 'file=@{placeholder}' \\\n  \
             -F 'fileName={name}' \\\n  \
             -F 'useUniqueFileName=false' \\\n  \
             -F 'folder={folder}' \\\n  \
             -F 'publicKey={public_key}' \\\n  \
             -F 'signature={signature}' \\\n  \
             -F 'expire={expire}' \\\n  \
             -F 'token={token}'",
            upload_url = self.upload_url,
            placeholder = LOCAL_FILE_PLACEHOLDER,
            name = auth.object_name,
            folder = self.folder,
            public_key = auth.public_key,
            signature = auth.signature,
            expire = auth.expire,
            token = auth.token,
        ))
    }

    async fn fetch_object_url(&self, object_id: &str) -> Result<String> {
        let url = format!("{}/files/{}/details", self.api_base, object_id);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.private_key, Some(""))
            .send()
            .await?;
        let details: FileDetails = Self::check(resp, "File details").await?.json().await?;
        if details.url.is_empty() && details.file_path.is_empty() {
            return Err(RelayError::storage(format!(
                "File details for {} carry no URL",
                object_id
            )));
        }
        Ok(self.object_url(details.url, &details.file_path))
    }

    /// Stream the object into `local_path`, never past the size limit
    ///
    /// A partial file is left for the caller, which owns `local_path`.
    async fn download_to(&self, object_id: &str, local_path: &Path) -> Result<u64> {
        info!("Downloading {} to {}", object_id, local_path.display());

        let file_url = self.fetch_object_url(object_id).await?;
        let resp = self.http.get(&file_url).send().await?;
        let mut resp = Self::check(resp, "Download").await?;

        if let Some(size) = resp.content_length() {
            if size > self.max_object_size {
                return Err(self.too_large(size));
            }
        }

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(local_path).await?;

        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_object_size {
                return Err(self.too_large(written));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("Downloaded {} bytes", written);
        Ok(written)
    }

    async fn upload_from(&self, local_path: &Path, object_name: &str) -> Result<StoredObject> {
        info!("Uploading {} to ImageKit as {}", local_path.display(), object_name);

        let bytes = tokio::fs::read(local_path).await?;
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(object_name.to_string()))
            .text("fileName", object_name.to_string())
            .text("folder", self.folder.clone())
            .text("useUniqueFileName", "false");

        let resp = self
            .http
            .post(&self.upload_url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await?;
        let entry: FileEntry = Self::check(resp, "Upload").await?.json().await?;

        debug!("Upload complete: {}", entry.file_id);
        Ok(self.stored(entry))
    }

    async fn find_by_name(&self, object_name: &str) -> Option<StoredObject> {
        info!("Searching for object: {}", object_name);

        let entries = match self.search(object_name).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error searching for object {}: {}", object_name, e);
                return None;
            }
        };
        debug!("Search result count: {}", entries.len());

        let wanted = object_name.to_lowercase();
        let mut first = None;
        for entry in entries {
            if entry.name.to_lowercase() == wanted {
                info!("Exact match found: {}", entry.name);
                return Some(self.stored(entry));
            }
            if first.is_none() {
                first = Some(entry);
            }
        }

        match first {
            Some(entry) => {
                warn!("No exact match, using first result: {}", entry.name);
                Some(self.stored(entry))
            }
            None => {
                warn!("Object {} not found", object_name);
                None
            }
        }
    }

    async fn delete(&self, object_id: &str) -> bool {
        info!("Deleting object {} from ImageKit", object_id);

        let url = format!("{}/files/{}", self.api_base, object_id);
        let result = match self
            .http
            .delete(&url)
            .basic_auth(&self.private_key, Some(""))
            .send()
            .await
        {
            Ok(resp) => Self::check(resp, "Delete").await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                debug!("Deleted object {}", object_id);
                true
            }
            Err(e) => {
                error!("Failed to delete object {}: {}", object_id, e);
                false
            }
        }
    }
}
