//! Server-side session lifecycle: create allocates a zero-length temp file
//! and a 24h expiry; PATCH appends exactly `Content-Length` bytes at the
//! declared offset, rejecting anything that doesn't match the file's
//! current length; completion is implicit once `offset == total_size`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Result, UploadError};
use crate::types::UploadSession;

const DEFAULT_EXPIRY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct UploadManager {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, UploadSession>>,
}

impl UploadManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), sessions: Mutex::new(HashMap::new()) }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    pub async fn create(&self, total_size: u64, metadata: BTreeMap<String, String>) -> Result<UploadSession> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let path = self.path_for(&id);
        OpenOptions::new().create(true).write(true).truncate(true).open(&path).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let session = UploadSession {
            id: id.clone(),
            total_size,
            offset: 0,
            metadata,
            created_at: now,
            expires_at: now + DEFAULT_EXPIRY_MS,
        };
        self.sessions.lock().insert(id, session.clone());
        tracing::debug!(session_id = %session.id, total_size, "upload session created");
        Ok(session)
    }

    fn get_session(&self, id: &str) -> Result<UploadSession> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(id.to_string()))
    }

    fn check_expiry(session: &UploadSession) -> Result<()> {
        if chrono::Utc::now().timestamp_millis() > session.expires_at {
            return Err(UploadError::SessionExpired(session.id.clone()));
        }
        Ok(())
    }

    /// `HEAD /api/tus/:id` — authoritative offset for client resume.
    pub fn head(&self, id: &str) -> Result<UploadSession> {
        let session = self.get_session(id)?;
        Self::check_expiry(&session)?;
        Ok(session)
    }

    /// `PATCH /api/tus/:id` — appends `bytes` at `upload_offset`, 409 via
    /// [`UploadError::OffsetMismatch`] if it doesn't match the session's
    /// current offset.
    pub async fn patch(&self, id: &str, upload_offset: u64, bytes: &[u8]) -> Result<UploadSession> {
        let session = self.get_session(id)?;
        Self::check_expiry(&session)?;

        if upload_offset != session.offset {
            return Err(UploadError::OffsetMismatch { expected: session.offset, actual: upload_offset });
        }
        if session.offset + bytes.len() as u64 > session.total_size {
            return Err(UploadError::ExceedsTotalSize);
        }

        let path = self.path_for(id);
        let mut file = OpenOptions::new().write(true).open(&path).await?;
        file.seek(std::io::SeekFrom::Start(upload_offset)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or_else(|| UploadError::SessionNotFound(id.to_string()))?;
        session.offset += bytes.len() as u64;
        let updated = session.clone();
        if updated.is_complete() {
            tracing::info!(session_id = %id, total_size = updated.total_size, "upload complete");
        }
        Ok(updated)
    }

    /// `DELETE /api/tus/:id` — cancels the session and removes its temp file.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existed = self.sessions.lock().remove(id).is_some();
        if !existed {
            return Err(UploadError::SessionNotFound(id.to_string()));
        }
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn list(&self) -> Vec<UploadSession> {
        let mut sessions: Vec<UploadSession> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Drops sessions (and their temp files) past their expiry. Intended to
    /// be called on a periodic housekeeping tick.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let expired: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| now > s.expires_at)
            .map(|s| s.id.clone())
            .collect();

        let count = expired.len();
        for id in expired {
            self.sessions.lock().remove(&id);
            let path = self.path_for(&id);
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(session_id = %id, error = %err, "failed to remove expired upload temp file");
                }
            }
        }
        Ok(count)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
