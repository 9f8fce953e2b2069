//! `/api/sync/*` — the core data path: clients push their outbox, pull the
//! server's change feed, and poll status.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::DateTime;
use driftline_applier::Mutation;
use driftline_realtime::ChangeEvent;
use driftline_sync::{PullItem, PullResponse, PushFailure, PushRequest, PushResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn push(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let mut response = PushResponse::default();

    for action in request.actions {
        let mutation = Mutation {
            id: action.id.clone(),
            kind: action.kind,
            collection: action.collection.clone(),
            document_id: action.document_id.clone(),
            data: action.data,
            timestamp: action.timestamp,
        };

        match state.applier.apply_one(&mutation) {
            Ok(doc) => {
                response.succeeded.push(action.id);
                state.record_mutation();

                let seq = state
                    .store
                    .changes(&action.collection, 0, usize::MAX)
                    .ok()
                    .and_then(|records| records.last().map(|r| r.seq))
                    .unwrap_or(0);

                state.broadcaster.broadcast(ChangeEvent {
                    collection: action.collection,
                    document_id: action.document_id,
                    document: serde_json::to_value(&doc).unwrap_or(Value::Null),
                    timestamp: action.timestamp,
                    seq,
                });
            }
            Err(err) => {
                response.failed.push(PushFailure {
                    action_id: action.id,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    pub collection: String,
    #[serde(default)]
    pub since: i64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    500
}

pub async fn pull(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>> {
    let records = state.store.changes(&query.collection, query.since, query.limit)?;
    let has_more = records.len() == query.limit;
    let since = records.last().map(|r| r.seq).unwrap_or(query.since);

    let items = records
        .into_iter()
        .map(|record| PullItem {
            collection: record.collection,
            document: serde_json::to_value(&record.doc).unwrap_or(Value::Null),
            timestamp: DateTime::parse_from_rfc3339(&record.doc.updated_at)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0),
            seq: record.seq,
        })
        .collect();

    Ok(Json(PullResponse {
        items,
        since,
        has_more,
        server_vector_clock: None,
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "pendingChanges": state.total_mutations(),
        "lastUpdate": state.last_update(),
        "connectedClients": state.connected_clients(),
    }))
}

pub async fn list_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<Json<Value>> {
    let docs = state.applier.list_collection(&collection)?;
    Ok(Json(json!({ "documents": docs })))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    match state.applier.get_document(&collection, &id)? {
        Some(doc) => Ok(Json(serde_json::to_value(doc).unwrap_or(Value::Null))),
        None => Err(ApiError::NotFound),
    }
}
