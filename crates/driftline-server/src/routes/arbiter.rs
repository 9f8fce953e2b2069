//! `/api/arbiter/*` — conflict detection and the four resolution strategies.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use driftline_arbiter::{CrdtResolveInput, CrdtResolveResult, ResolveInput, ResolveResult};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ResolveInput>,
) -> Json<driftline_arbiter::ConflictCheck> {
    Json(state.arbiter.check(&input))
}

pub async fn resolve(State(state): State<Arc<AppState>>, Json(input): Json<ResolveInput>) -> Json<ResolveResult> {
    Json(state.arbiter.resolve_lww(&input))
}

pub async fn resolve_merge(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ResolveInput>,
) -> Json<ResolveResult> {
    Json(state.arbiter.resolve_field_merge(&input))
}

pub async fn resolve_fields(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ResolveInput>,
) -> Json<ResolveResult> {
    Json(state.arbiter.resolve_field_lww(&input))
}

/// `CrdtResolveInput` carries raw `Vec<u8>` `yrs` update bytes and has no
/// `Deserialize` impl of its own; the wire shape base64-encodes them, the
/// same convention `driftline_crdt`'s transport envelopes use.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtResolveWire {
    pub collection: String,
    pub document_id: String,
    #[serde(with = "base64_bytes")]
    pub client_update: Vec<u8>,
    #[serde(default, with = "base64_bytes_option")]
    pub server_update: Option<Vec<u8>>,
}

pub async fn resolve_crdt(
    State(state): State<Arc<AppState>>,
    Json(wire): Json<CrdtResolveWire>,
) -> Json<CrdtResolveResult> {
    let input = CrdtResolveInput {
        collection: wire.collection,
        document_id: wire.document_id,
        client_update: wire.client_update,
        server_update: wire.server_update,
    };
    Json(state.arbiter.resolve_crdt(&input))
}

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_option {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|text| STANDARD.decode(&text).map_err(serde::de::Error::custom)).transpose()
    }
}
