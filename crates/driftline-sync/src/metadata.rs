//! Persistence for the `sync_metadata` singleton row.

use std::sync::Arc;

use driftline_store::StoreBackend;

use crate::error::Result;
use crate::types::SyncMetadata;

const COLLECTION: &str = "sync_metadata";
const SINGLETON_ID: &str = "metadata";

pub fn load(store: &Arc<dyn StoreBackend>) -> Result<SyncMetadata> {
    match store.get(COLLECTION, SINGLETON_ID)? {
        Some(doc) => Ok(serde_json::from_value(doc.data)?),
        None => Ok(SyncMetadata::default()),
    }
}

/// Persisted only on a successful pull, atomically with the merged vector
/// clock — never on a push-only or failed attempt.
pub fn save(store: &Arc<dyn StoreBackend>, metadata: &SyncMetadata) -> Result<()> {
    let value = serde_json::to_value(metadata)?;
    match store.get(COLLECTION, SINGLETON_ID)? {
        Some(_) => {
            store.patch(COLLECTION, SINGLETON_ID, value)?;
        }
        None => {
            store.insert(COLLECTION, Some(SINGLETON_ID), value)?;
        }
    }
    Ok(())
}
