//! HTTP transport for the tus-like protocol, abstracted so uploads can be
//! driven by an in-process mock in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{Result, UploadError};
use crate::types::UploadSession;

#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn create(&self, url: &str, total_size: u64, metadata: BTreeMap<String, String>) -> Result<UploadSession>;
    async fn head(&self, url: &str, session_id: &str) -> Result<UploadSession>;
    async fn patch(&self, url: &str, session_id: &str, offset: u64, bytes: &[u8]) -> Result<UploadSession>;
    async fn delete(&self, url: &str, session_id: &str) -> Result<()>;
}

pub struct HttpUploadTransport {
    client: reqwest::Client,
}

impl Default for HttpUploadTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpUploadTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn create(&self, url: &str, total_size: u64, metadata: BTreeMap<String, String>) -> Result<UploadSession> {
        let response = self
            .client
            .post(format!("{url}/api/tus"))
            .header("Upload-Length", total_size.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UploadError::Network(format!("create failed with status {}", response.status())));
        }
        Ok(response.json().await.map_err(|e| UploadError::Network(e.to_string()))?)
    }

    async fn head(&self, url: &str, session_id: &str) -> Result<UploadSession> {
        let response = self
            .client
            .head(format!("{url}/api/tus/{session_id}"))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UploadError::SessionNotFound(session_id.to_string()));
        }
        if !status.is_success() {
            return Err(UploadError::Network(format!("head failed with status {status}")));
        }

        let offset: u64 = response
            .headers()
            .get("Upload-Offset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let total_size: u64 = response
            .headers()
            .get("Upload-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(UploadSession {
            id: session_id.to_string(),
            total_size,
            offset,
            metadata: BTreeMap::new(),
            created_at: 0,
            expires_at: 0,
        })
    }

    async fn patch(&self, url: &str, session_id: &str, offset: u64, bytes: &[u8]) -> Result<UploadSession> {
        let response = self
            .client
            .patch(format!("{url}/api/tus/{session_id}"))
            .header("Content-Type", "application/offset+octet-stream")
            .header("Upload-Offset", offset.to_string())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            let expected: u64 = response
                .headers()
                .get("Upload-Offset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return Err(UploadError::OffsetMismatch { expected, actual: offset });
        }
        if !status.is_success() {
            return Err(UploadError::Network(format!("patch failed with status {status}")));
        }
        Ok(response.json().await.map_err(|e| UploadError::Network(e.to_string()))?)
    }

    async fn delete(&self, url: &str, session_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{url}/api/tus/{session_id}"))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(UploadError::Network(format!("delete failed with status {}", response.status())));
        }
        Ok(())
    }
}
