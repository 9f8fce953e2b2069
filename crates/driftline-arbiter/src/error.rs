use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error(transparent)]
    Store(#[from] driftline_store::StoreError),

    #[error(transparent)]
    Crdt(#[from] driftline_crdt::CrdtError),
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
