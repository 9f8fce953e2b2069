use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Store(#[from] driftline_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OutboxError>;
