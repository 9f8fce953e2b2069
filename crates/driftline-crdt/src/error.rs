use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("failed to decode CRDT update for {collection}/{document_id}: {reason}")]
    Decode {
        collection: String,
        document_id: String,
        reason: String,
    },

    #[error("no such CRDT document: {collection}/{document_id}")]
    NotFound {
        collection: String,
        document_id: String,
    },
}
