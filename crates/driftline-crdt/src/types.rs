//! Transport envelopes for CRDT state and incremental updates.
//!
//! Both carry `documentId`/`collection` so a receiver can route without any
//! prior state, and carry their binary payloads as base64 so the envelope
//! is plain JSON-safe.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtState {
    pub document_id: String,
    pub collection: String,
    #[serde(with = "base64_bytes")]
    pub state_vector: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub full_update: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtUpdate {
    pub document_id: String,
    pub collection: String,
    #[serde(with = "base64_bytes")]
    pub update: Vec<u8>,
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

/// Which side produced an update — used to suppress echo of remotely
/// applied updates back out through `onLocalChange` observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub(crate) fn tag(self) -> &'static [u8] {
        match self {
            Origin::Local => b"local",
            Origin::Remote => b"remote",
        }
    }
}
