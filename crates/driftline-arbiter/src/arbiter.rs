use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use driftline_crdt::{CrdtManager, CrdtState};
use driftline_store::StoreBackend;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::types::{CrdtResolveInput, CrdtResolveResult, DocVersion, FieldConflict, ResolveInput, ResolveResult, Winner};

const METADATA_KEYS: &[&str] = &["id", "rev", "vectorClock", "version", "updatedAt", "updatedBy"];

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Pure given its inputs: detects whether a client/server document pair
/// diverges and, if asked, produces a resolved merge. The only I/O it
/// performs is fetching the server document when the caller did not supply
/// one inline.
pub struct Arbiter {
    store: Arc<dyn StoreBackend>,
    server_replica_id: String,
    crdt_manager: CrdtManager,
    crdt_cache: Mutex<HashMap<String, CrdtState>>,
}

impl Arbiter {
    pub fn new(store: Arc<dyn StoreBackend>) -> Self {
        Self {
            store,
            server_replica_id: "server".to_string(),
            crdt_manager: CrdtManager::new("server"),
            crdt_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(collection: &str, document_id: &str) -> String {
        format!("{collection}:{document_id}")
    }

    /// Looks up the cached server-side CRDT state for `collection:documentId`.
    pub fn crdt_cache_get(&self, collection: &str, document_id: &str) -> Option<CrdtState> {
        self.crdt_cache.lock().get(&Self::cache_key(collection, document_id)).cloned()
    }

    pub fn crdt_cache_set(&self, collection: &str, document_id: &str, state: CrdtState) {
        self.crdt_cache.lock().insert(Self::cache_key(collection, document_id), state);
    }

    pub fn crdt_cache_delete(&self, collection: &str, document_id: &str) {
        self.crdt_cache.lock().remove(&Self::cache_key(collection, document_id));
    }

    pub fn crdt_cache_clear(&self) {
        self.crdt_cache.lock().clear();
    }

    /// Resolves `server_data`/`server_version` either from the input or, if
    /// absent, by fetching the live document from the store.
    ///
    /// `Err(())` means the fetch itself failed (conservative-failure path);
    /// `Ok(None)` means there is genuinely no server document yet.
    fn resolve_server_side(&self, input: &ResolveInput) -> std::result::Result<Option<(Value, DocVersion)>, ()> {
        if let Some(data) = &input.server_data {
            let version = input.server_version.clone().unwrap_or_else(|| DocVersion {
                updated_at: Utc::now().to_rfc3339(),
                vector_clock: None,
            });
            return Ok(Some((data.clone(), version)));
        }

        match self.store.get(&input.collection, &input.document_id) {
            Ok(Some(doc)) if !doc.deleted => {
                let version = input.server_version.clone().unwrap_or_else(|| DocVersion {
                    updated_at: doc.updated_at.clone(),
                    vector_clock: None,
                });
                Ok(Some((doc.data, version)))
            }
            Ok(_) => Ok(None),
            Err(err) => {
                tracing::warn!(error = %err, "arbiter: failed to fetch server document");
                Err(())
            }
        }
    }

    fn detect_conflict(&self, client: &DocVersion, server: &DocVersion) -> bool {
        match (&client.vector_clock, &server.vector_clock) {
            (Some(cvc), Some(svc)) => cvc.get(&self.server_replica_id) < svc.get(&self.server_replica_id),
            _ => {
                let diff = (parse_time(&client.updated_at) - parse_time(&server.updated_at)).num_milliseconds();
                diff.abs() > 1000
            }
        }
    }

    /// `/api/arbiter/check`
    pub fn check(&self, input: &ResolveInput) -> crate::types::ConflictCheck {
        use crate::types::ConflictCheck;

        let outcome = self.resolve_server_side(input);
        match outcome {
            Err(()) | Ok(None) => ConflictCheck {
                has_conflict: false,
                document_id: input.document_id.clone(),
                client_version: input.client_version.vector_clock.clone(),
                server_version: None,
                conflict_details: None,
            },
            Ok(Some((_, server_version))) => {
                let has_conflict = self.detect_conflict(&input.client_version, &server_version);
                ConflictCheck {
                    has_conflict,
                    document_id: input.document_id.clone(),
                    client_version: input.client_version.vector_clock.clone(),
                    server_version: server_version.vector_clock.clone(),
                    conflict_details: has_conflict.then(|| "client and server versions diverge".to_string()),
                }
            }
        }
    }

    /// `/api/arbiter/resolve` — whole-document last-write-wins.
    pub fn resolve_lww(&self, input: &ResolveInput) -> ResolveResult {
        match self.resolve_server_side(input) {
            Err(()) => ResolveResult::conservative_server_failure("failed to fetch server document"),
            Ok(None) => ResolveResult {
                resolved: true,
                winner: Some(Winner::Client),
                data: Some(input.client_data.clone()),
                conflict: Vec::new(),
                reason: "no server document: client wins".to_string(),
            },
            Ok(Some((server_data, server_version))) => {
                let client_time = parse_time(&input.client_version.updated_at);
                let server_time = parse_time(&server_version.updated_at);
                if client_time > server_time {
                    ResolveResult {
                        resolved: true,
                        winner: Some(Winner::Client),
                        data: Some(input.client_data.clone()),
                        conflict: Vec::new(),
                        reason: "client updatedAt is newer".to_string(),
                    }
                } else {
                    let reason = if client_time == server_time {
                        "tie-breaker: equal updatedAt favors server".to_string()
                    } else {
                        "server updatedAt is newer".to_string()
                    };
                    ResolveResult {
                        resolved: true,
                        winner: Some(Winner::Server),
                        data: Some(server_data),
                        conflict: Vec::new(),
                        reason,
                    }
                }
            }
        }
    }

    fn merge_fields(&self, input: &ResolveInput, prefer_client_on_tie: bool) -> ResolveResult {
        match self.resolve_server_side(input) {
            Err(()) => ResolveResult::conservative_server_failure("failed to fetch server document"),
            Ok(None) => ResolveResult {
                resolved: true,
                winner: Some(Winner::Client),
                data: Some(input.client_data.clone()),
                conflict: Vec::new(),
                reason: "no server document: client wins".to_string(),
            },
            Ok(Some((server_data, server_version))) => {
                let client_obj = as_object(&input.client_data);
                let server_obj = as_object(&server_data);
                let mut merged = server_obj.clone();
                let mut conflicts = Vec::new();

                let mut keys: Vec<&String> = client_obj.keys().chain(server_obj.keys()).collect();
                keys.sort();
                keys.dedup();

                for key in keys {
                    if METADATA_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    let client_val = client_obj.get(key);
                    let server_val = server_obj.get(key);
                    match (client_val, server_val) {
                        (Some(c), None) => {
                            merged.insert(key.clone(), c.clone());
                        }
                        (None, Some(_)) => {}
                        (Some(c), Some(s)) if c == s => {}
                        (Some(c), Some(s)) => {
                            let winner = if prefer_client_on_tie {
                                Winner::Client
                            } else {
                                let client_ts = input
                                    .client_field_timestamps
                                    .get(key)
                                    .cloned()
                                    .unwrap_or_else(|| input.client_version.updated_at.clone());
                                let server_ts = input
                                    .server_field_timestamps
                                    .get(key)
                                    .cloned()
                                    .unwrap_or_else(|| server_version.updated_at.clone());
                                if parse_time(&client_ts) >= parse_time(&server_ts) {
                                    Winner::Client
                                } else {
                                    Winner::Server
                                }
                            };
                            let chosen = match winner {
                                Winner::Client => c.clone(),
                                _ => s.clone(),
                            };
                            merged.insert(key.clone(), chosen);
                            conflicts.push(FieldConflict {
                                field: key.clone(),
                                client_value: c.clone(),
                                server_value: s.clone(),
                                resolution: winner,
                            });
                        }
                        (None, None) => {}
                    }
                }

                merged.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));
                merged.insert(
                    "updatedBy".to_string(),
                    Value::String(input.client_id.clone().unwrap_or_else(|| "merged".to_string())),
                );

                ResolveResult {
                    resolved: true,
                    winner: Some(Winner::Merged),
                    data: Some(Value::Object(merged)),
                    conflict: conflicts,
                    reason: if prefer_client_on_tie { "field-lww merge" } else { "field merge" }.to_string(),
                }
            }
        }
    }

    /// `/api/arbiter/resolve/merge` — field-level merge keyed by per-field
    /// timestamps, falling back to document-level `updatedAt`.
    pub fn resolve_field_merge(&self, input: &ResolveInput) -> ResolveResult {
        self.merge_fields(input, false)
    }

    /// `/api/arbiter/resolve/fields` — simpler variant: client wins any
    /// field present on both sides, but every divergence is still recorded.
    pub fn resolve_field_lww(&self, input: &ResolveInput) -> ResolveResult {
        self.merge_fields(input, true)
    }

    /// `/api/arbiter/resolve/crdt`
    pub fn resolve_crdt(&self, input: &CrdtResolveInput) -> CrdtResolveResult {
        let result = (|| -> std::result::Result<CrdtState, driftline_crdt::CrdtError> {
            self.crdt_manager.apply_update(&input.collection, &input.document_id, &input.client_update)?;
            if let Some(server_update) = &input.server_update {
                self.crdt_manager.apply_update(&input.collection, &input.document_id, server_update)?;
            }
            let state = self.crdt_manager.get_state(&input.collection, &input.document_id);
            self.crdt_cache_set(&input.collection, &input.document_id, state.clone());
            Ok(state)
        })();

        match result {
            Ok(state) => CrdtResolveResult {
                resolved: true,
                merged_state: Some(state),
                error: None,
            },
            Err(err) => CrdtResolveResult {
                resolved: false,
                merged_state: None,
                error: Some(err.to_string()),
            },
        }
    }
}
