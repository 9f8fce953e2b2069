use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Outbox(#[from] driftline_outbox::OutboxError),

    #[error(transparent)]
    Store(#[from] driftline_store::StoreError),

    #[error(transparent)]
    Applier(#[from] driftline_applier::ApplierError),

    #[error(transparent)]
    Codec(#[from] driftline_codec::CodecError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
