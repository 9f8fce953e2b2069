//! Chunked upload driver: discovers a resumable session via the local
//! bucket, otherwise creates one, then PATCHes fixed-size chunks with
//! per-chunk retry. The server's HEAD/PATCH response offset is always
//! authoritative; the bucket's `bytes_sent` is advisory only (see
//! spec Design Notes on trusting the server over the client).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client::bucket::SessionBucket;
use crate::client::transport::UploadTransport;
use crate::error::{Result, UploadError};
use crate::types::{BucketKey, ClientUploadRecord};

pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;
const MAX_CHUNK_RETRIES: u32 = 3;
const INITIAL_CHUNK_BACKOFF: Duration = Duration::from_secs(1);
const MAX_CHUNK_BACKOFF: Duration = Duration::from_secs(10);

pub struct UploadClient {
    url: String,
    transport: Arc<dyn UploadTransport>,
    bucket: Arc<dyn SessionBucket>,
    chunk_size: usize,
}

impl UploadClient {
    pub fn new(url: impl Into<String>, transport: Arc<dyn UploadTransport>, bucket: Arc<dyn SessionBucket>) -> Self {
        Self { url: url.into(), transport, bucket, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Uploads `data` in full, resuming a prior attempt for the same
    /// content-type + size if the bucket has one.
    pub async fn upload(&self, data: &[u8], content_type: &str) -> Result<String> {
        let key = BucketKey::new(content_type, data.len() as u64);

        let (session_id, mut offset) = match self.bucket.get(&key) {
            Some(record) => {
                // Resume: trust the server's authoritative offset, not the
                // bucket's advisory `bytes_sent`.
                match self.transport.head(&self.url, &record.session_id).await {
                    Ok(session) => (session.id, session.offset),
                    Err(UploadError::SessionNotFound(_)) => {
                        self.bucket.remove(&key);
                        self.start_session(&key, data, content_type).await?
                    }
                    Err(err) => return Err(err),
                }
            }
            None => self.start_session(&key, data, content_type).await?,
        };

        while (offset as usize) < data.len() {
            let end = (offset as usize + self.chunk_size).min(data.len());
            let chunk = &data[offset as usize..end];
            let session = self.patch_with_retry(&session_id, offset, chunk).await?;
            offset = session.offset;

            self.bucket.put(
                key.clone(),
                ClientUploadRecord {
                    session_id: session_id.clone(),
                    url: format!("{}/api/tus/{session_id}", self.url),
                    total_size: data.len() as u64,
                    bytes_sent: offset,
                    content_type: content_type.to_string(),
                },
            );
        }

        self.bucket.remove(&key);
        Ok(session_id)
    }

    async fn start_session(&self, key: &BucketKey, data: &[u8], content_type: &str) -> Result<(String, u64)> {
        let mut metadata = BTreeMap::new();
        metadata.insert("contentType".to_string(), content_type.to_string());
        let session = self.transport.create(&self.url, data.len() as u64, metadata).await?;

        self.bucket.put(
            key.clone(),
            ClientUploadRecord {
                session_id: session.id.clone(),
                url: format!("{}/api/tus/{}", self.url, session.id),
                total_size: data.len() as u64,
                bytes_sent: 0,
                content_type: content_type.to_string(),
            },
        );
        Ok((session.id, session.offset))
    }

    async fn patch_with_retry(&self, session_id: &str, offset: u64, chunk: &[u8]) -> Result<crate::types::UploadSession> {
        let mut backoff = INITIAL_CHUNK_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.transport.patch(&self.url, session_id, offset, chunk).await {
                Ok(session) => return Ok(session),
                Err(UploadError::OffsetMismatch { expected, .. }) => {
                    // the server disagrees about where we are; re-sync via
                    // HEAD rather than retrying blind.
                    return self.transport.head(&self.url, session_id).await.and_then(|session| {
                        if session.offset == expected {
                            Ok(session)
                        } else {
                            Err(UploadError::OffsetMismatch { expected: session.offset, actual: offset })
                        }
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_CHUNK_RETRIES {
                        return Err(err);
                    }
                    tracing::warn!(session_id, attempt, error = %err, "upload chunk failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_CHUNK_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::client::bucket::MemorySessionBucket;
    use crate::types::UploadSession;

    use super::*;

    struct MockTransport {
        sessions: parking_lot::Mutex<std::collections::HashMap<String, UploadSession>>,
        fail_next_patches: AtomicUsize,
    }

    impl MockTransport {
        fn new() -> Self {
            Self { sessions: parking_lot::Mutex::new(std::collections::HashMap::new()), fail_next_patches: AtomicUsize::new(0) }
        }

        fn fail_next(&self, n: usize) {
            self.fail_next_patches.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UploadTransport for MockTransport {
        async fn create(&self, _url: &str, total_size: u64, metadata: BTreeMap<String, String>) -> Result<UploadSession> {
            let id = format!("session-{}", self.sessions.lock().len() + 1);
            let session = UploadSession { id: id.clone(), total_size, offset: 0, metadata, created_at: 0, expires_at: i64::MAX };
            self.sessions.lock().insert(id, session.clone());
            Ok(session)
        }

        async fn head(&self, _url: &str, session_id: &str) -> Result<UploadSession> {
            self.sessions.lock().get(session_id).cloned().ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))
        }

        async fn patch(&self, _url: &str, session_id: &str, offset: u64, bytes: &[u8]) -> Result<UploadSession> {
            if self.fail_next_patches.load(Ordering::SeqCst) > 0 {
                self.fail_next_patches.fetch_sub(1, Ordering::SeqCst);
                return Err(UploadError::Network("simulated failure".to_string()));
            }
            let mut sessions = self.sessions.lock();
            let session = sessions.get_mut(session_id).ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))?;
            if session.offset != offset {
                return Err(UploadError::OffsetMismatch { expected: session.offset, actual: offset });
            }
            session.offset += bytes.len() as u64;
            Ok(session.clone())
        }

        async fn delete(&self, _url: &str, session_id: &str) -> Result<()> {
            self.sessions.lock().remove(session_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn uploads_small_payload_in_one_chunk() {
        let transport = Arc::new(MockTransport::new());
        let bucket = Arc::new(MemorySessionBucket::new());
        let client = UploadClient::new("http://localhost:3000", transport.clone(), bucket);

        let data = vec![1u8; 10];
        let session_id = client.upload(&data, "application/octet-stream").await.unwrap();
        let session = transport.head("http://localhost:3000", &session_id).await.unwrap();
        assert_eq!(session.offset, 10);
    }

    #[tokio::test]
    async fn uploads_across_multiple_chunks() {
        let transport = Arc::new(MockTransport::new());
        let bucket = Arc::new(MemorySessionBucket::new());
        let client = UploadClient::new("http://localhost:3000", transport.clone(), bucket).with_chunk_size(4);

        let data = vec![7u8; 10];
        let session_id = client.upload(&data, "application/octet-stream").await.unwrap();
        let session = transport.head("http://localhost:3000", &session_id).await.unwrap();
        assert_eq!(session.offset, 10);
    }

    #[tokio::test]
    async fn a_failed_chunk_is_retried_and_eventually_succeeds() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next(1);
        let bucket = Arc::new(MemorySessionBucket::new());
        let client = UploadClient::new("http://localhost:3000", transport.clone(), bucket);

        let data = vec![3u8; 5];
        let session_id = client.upload(&data, "application/octet-stream").await.unwrap();
        let session = transport.head("http://localhost:3000", &session_id).await.unwrap();
        assert_eq!(session.offset, 5);
    }

    #[tokio::test]
    async fn bucket_entry_is_cleared_once_the_upload_completes() {
        let transport = Arc::new(MockTransport::new());
        let bucket = Arc::new(MemorySessionBucket::new());
        let client = UploadClient::new("http://localhost:3000", transport, bucket.clone());

        let data = vec![1u8; 10];
        client.upload(&data, "text/plain").await.unwrap();

        let key = BucketKey::new("text/plain", 10);
        assert!(bucket.get(&key).is_none());
    }

    #[tokio::test]
    async fn a_restart_resumes_from_the_bucket_using_the_servers_authoritative_offset() {
        let transport = Arc::new(MockTransport::new());
        let bucket = Arc::new(MemorySessionBucket::new());

        let key = BucketKey::new("text/plain", 10);
        let session = transport.create("http://localhost:3000", 10, BTreeMap::new()).await.unwrap();
        transport.patch("http://localhost:3000", &session.id, 0, &[0u8; 6]).await.unwrap();

        // the bucket's advisory bytes_sent is wrong (stale); the server's
        // HEAD offset (6) must win.
        bucket.put(
            key,
            ClientUploadRecord {
                session_id: session.id.clone(),
                url: format!("http://localhost:3000/api/tus/{}", session.id),
                total_size: 10,
                bytes_sent: 0,
                content_type: "text/plain".to_string(),
            },
        );

        let client = UploadClient::new("http://localhost:3000", transport.clone(), bucket);
        let data = vec![0u8; 10];
        let session_id = client.upload(&data, "text/plain").await.unwrap();
        assert_eq!(session_id, session.id);

        let final_session = transport.head("http://localhost:3000", &session_id).await.unwrap();
        assert_eq!(final_session.offset, 10);
    }
}
