use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single committed mutation, as broadcast to every subscriber and kept
/// in the ring buffer for late joiners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub collection: String,
    pub document_id: String,
    pub document: Value,
    pub timestamp: i64,
    pub seq: i64,
}

/// Client -> server control frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { collections: Vec<String> },
}

/// Server -> client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected,
    Change { data: ChangeEvent },
    Error { error: String },
}
