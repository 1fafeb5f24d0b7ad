//! Remote-storage staging.
//!
//! Uploads the final artifact to the file host and returns its raw public
//! URL. The size cap is checked before any bytes move: an oversized artifact
//! is a fatal, descriptive error rather than a doomed upload attempt.

use crate::config::StorageConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Errors from the staging boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The artifact exceeds the destination's size cap. Fatal to the session.
    #[error("artifact is {size} bytes, over the {cap} byte storage cap")]
    TooLarge { size: u64, cap: u64 },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stages a local file at a public URL.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn stage(&self, path: &Path) -> Result<String, StorageError>;
}

/// File-host-backed implementation.
pub struct HttpRemoteStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_upload_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpRemoteStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: super::build_http_client(Duration::from_secs(config.upload_timeout_secs)),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

#[async_trait]
impl RemoteStorage for HttpRemoteStorage {
    async fn stage(&self, path: &Path) -> Result<String, StorageError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.max_upload_bytes {
            return Err(StorageError::TooLarge {
                size,
                cap: self.max_upload_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.mp4".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::Upload(format!(
                "file host returned HTTP {}",
                response.status()
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        info!(url = %uploaded.url, bytes = size, "artifact staged at public url");
        Ok(uploaded.url)
    }
}
