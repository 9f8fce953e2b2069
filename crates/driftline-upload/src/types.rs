use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Server-side session state for one in-progress or completed upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub total_size: u64,
    pub offset: u64,
    pub metadata: BTreeMap<String, String>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl UploadSession {
    pub fn is_complete(&self) -> bool {
        self.offset == self.total_size
    }
}

/// Client-side bookkeeping persisted in the local metadata bucket so a
/// restarted client can discover an in-progress session and resume it with
/// HEAD + PATCH instead of starting over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientUploadRecord {
    pub session_id: String,
    pub url: String,
    pub total_size: u64,
    /// Advisory only — the server's HEAD response is authoritative on resume.
    pub bytes_sent: u64,
    pub content_type: String,
}

/// Key under which a [`ClientUploadRecord`] is stored: content-type and
/// size together are a reasonable proxy for "the same logical upload".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub content_type: String,
    pub size: u64,
}

impl BucketKey {
    pub fn new(content_type: impl Into<String>, size: u64) -> Self {
        Self { content_type: content_type.into(), size }
    }
}
