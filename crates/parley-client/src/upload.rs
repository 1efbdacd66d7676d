//! Attachment upload collaborator: turns raw bytes into a URL a message can
//! reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::UploadError;

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// POSTs the raw bytes to a fixed endpoint which answers `{"url": "..."}`.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<String, UploadError> {
        let size = data.len();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UploadError::Http(format!("status {}", resp.status())));
        }

        let body: UploadResponse = resp
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        if body.url.is_empty() {
            return Err(UploadError::InvalidResponse("empty url".into()));
        }

        info!(size, url = %body.url, "Attachment uploaded");
        Ok(body.url)
    }
}

/// Stand-in used when no upload endpoint is configured.
pub struct DisabledUploader;

#[async_trait]
impl Uploader for DisabledUploader {
    async fn upload(&self, _data: Bytes, _content_type: &str) -> Result<String, UploadError> {
        Err(UploadError::NotConfigured)
    }
}

/// Keeps uploads in memory and hands out `memory://` URLs.
#[derive(Default)]
pub struct MemoryUploader {
    uploads: Mutex<Vec<(String, Bytes)>>,
    fail: AtomicBool,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploaded(&self) -> usize {
        self.uploads.lock().map(|u| u.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<String, UploadError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Http("rejected".into()));
        }
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|e| UploadError::Http(e.to_string()))?;
        let url = format!("memory://{}/{}", content_type, uploads.len());
        debug!(url = %url, size = data.len(), "Stored upload");
        uploads.push((url.clone(), data));
        Ok(url)
    }
}
