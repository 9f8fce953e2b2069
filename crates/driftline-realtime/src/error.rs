use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Applier(#[from] driftline_applier::ApplierError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
