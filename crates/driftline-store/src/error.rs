use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("document already exists: {collection}/{id}")]
    DocumentAlreadyExists { collection: String, id: String },

    #[error("unique constraint violated on {collection}.{field}")]
    UniqueConstraint { collection: String, field: String },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
