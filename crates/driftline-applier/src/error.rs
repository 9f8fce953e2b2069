use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplierError {
    #[error("document already exists: {collection}/{document_id}")]
    DocumentAlreadyExists { collection: String, document_id: String },

    #[error("document not found: {collection}/{document_id}")]
    DocumentNotFound { collection: String, document_id: String },

    #[error(transparent)]
    Store(#[from] driftline_store::StoreError),
}

pub type Result<T> = std::result::Result<T, ApplierError>;
