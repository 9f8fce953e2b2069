use std::collections::HashMap;
use std::time::Duration;

use driftline_vclock::VectorClock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Lww,
    Crdt,
}

/// Recognized option tree, mirroring `sync.*` from the client configuration
/// surface.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub url: String,
    pub interval: Duration,
    pub batch_size: usize,
    pub headers: HashMap<String, String>,
    pub conflict_strategy: ConflictStrategy,
    pub codec_options: driftline_codec::CodecOptions,
    pub replica_id: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/sync".to_string(),
            interval: Duration::from_secs(60),
            batch_size: 100,
            headers: HashMap::new(),
            conflict_strategy: ConflictStrategy::Lww,
            codec_options: driftline_codec::CodecOptions::default(),
            replica_id: driftline_outbox::Action::new_id(),
        }
    }
}

/// Explicit sync-attempt state machine, so cancellation points and
/// crash-recovery invariants are visible rather than buried in coroutine
/// control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Draining,
    Pushing,
    Pulling,
    Cleaning,
}

/// Observable sync state, broadcast on every phase transition.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub phase: Phase,
    pub is_syncing: bool,
    pub last_sync_at: Option<i64>,
    pub pending_count: usize,
    pub error: Option<String>,
    pub vector_clock: VectorClock,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            is_syncing: false,
            last_sync_at: None,
            pending_count: 0,
            error: None,
            vector_clock: VectorClock::new(),
        }
    }
}

/// Singleton per-client cursor, persisted atomically after a successful
/// pull and used as the `since` cursor on the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub last_sync_at: i64,
    #[serde(default)]
    pub vector_clock: VectorClock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: driftline_applier::MutationKind,
    pub collection: String,
    pub document_id: String,
    pub data: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub actions: Vec<PushAction>,
    pub vector_clock: VectorClock,
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub succeeded: Vec<String>,
    pub failed: Vec<PushFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFailure {
    pub action_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullItem {
    pub collection: String,
    pub document: Value,
    pub timestamp: i64,
    pub seq: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub items: Vec<PullItem>,
    pub since: i64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub server_vector_clock: Option<VectorClock>,
}
