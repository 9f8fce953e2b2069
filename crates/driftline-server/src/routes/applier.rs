//! `/api/applier/*` — direct single-mutation and batch application, bypassing
//! the outbox/sync cursor bookkeeping.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use driftline_applier::Mutation;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn apply(State(state): State<Arc<AppState>>, Json(mutation): Json<Mutation>) -> Result<Json<Value>> {
    let outcome = state.applier.apply(&mutation);
    if outcome.success {
        state.record_mutation();
    }
    Ok(Json(serde_json::to_value(outcome).unwrap_or(Value::Null)))
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Json(mutations): Json<Vec<Mutation>>,
) -> Result<Json<Value>> {
    let result = state.applier.apply_batch(&mutations);
    for _ in &result.succeeded {
        state.record_mutation();
    }
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
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

pub async fn collection_info(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<Json<Value>> {
    let info = state.applier.collection_info(&collection)?;
    Ok(Json(serde_json::to_value(info).unwrap_or(Value::Null)))
}
