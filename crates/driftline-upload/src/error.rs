use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("upload session expired: {0}")]
    SessionExpired(String),

    #[error("offset mismatch: expected {expected}, got {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("chunk would exceed declared total size")]
    ExceedsTotalSize,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;
