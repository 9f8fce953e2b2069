use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tagged mutation variant, matching the wire shape accepted by
/// `/api/sync/push` and `/api/applier/apply`: `Create` carries a full
/// document, `Update` a partial patch, `Delete` ignores `data` and only
/// soft-deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub collection: String,
    pub document_id: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub success: bool,
    pub document_id: String,
    pub rev: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMutation {
    pub action_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedMutation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub doc_count: usize,
    pub update_seq: i64,
}
