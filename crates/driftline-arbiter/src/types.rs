use std::collections::HashMap;

use driftline_vclock::VectorClock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document-side version information carried alongside a conflict payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocVersion {
    pub updated_at: String,
    #[serde(default)]
    pub vector_clock: Option<VectorClock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResolveInput {
    pub document_id: String,
    pub collection: String,
    #[serde(default)]
    pub client_version: DocVersion,
    #[serde(default)]
    pub server_version: Option<DocVersion>,
    pub client_data: Value,
    #[serde(default)]
    pub server_data: Option<Value>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Per-field last-write timestamps, when the caller tracks them more
    /// granularly than the document-level `updatedAt`.
    #[serde(default)]
    pub client_field_timestamps: HashMap<String, String>,
    #[serde(default)]
    pub server_field_timestamps: HashMap<String, String>,
}

impl Default for DocVersion {
    fn default() -> Self {
        Self {
            updated_at: chrono::Utc::now().to_rfc3339(),
            vector_clock: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Client,
    Server,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
    pub field: String,
    pub client_value: Value,
    pub server_value: Value,
    pub resolution: Winner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    pub resolved: bool,
    pub winner: Option<Winner>,
    pub data: Option<Value>,
    #[serde(default)]
    pub conflict: Vec<FieldConflict>,
    pub reason: String,
}

impl ResolveResult {
    pub(crate) fn conservative_server_failure(reason: impl Into<String>) -> Self {
        Self {
            resolved: false,
            winner: Some(Winner::Server),
            data: None,
            conflict: Vec::new(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub document_id: String,
    pub client_version: Option<VectorClock>,
    pub server_version: Option<VectorClock>,
    pub conflict_details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrdtResolveInput {
    pub collection: String,
    pub document_id: String,
    pub client_update: Vec<u8>,
    pub server_update: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtResolveResult {
    pub resolved: bool,
    pub merged_state: Option<driftline_crdt::CrdtState>,
    pub error: Option<String>,
}
