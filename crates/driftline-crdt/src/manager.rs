//! `CrdtManager` — owns every in-memory CRDT document for one replica and
//! is the only thing allowed to touch them.
//!
//! Local writes (`set_field`/`set_fields`) are tagged with the local
//! replica id and fire `onLocalChange`; remote applies
//! (`apply_update`/`apply_state`) are tagged `remote` and never do, which is
//! what keeps replicas from re-broadcasting echoes of what they just
//! received. The distinction is structural (which method you called), not
//! introspected from the CRDT engine, which keeps the observer contract
//! exact regardless of `yrs`'s own internal event plumbing.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::doc::CrdtDocument;
use crate::error::CrdtError;
use crate::types::{CrdtState, CrdtUpdate, Origin};

pub type LocalChangeCallback = Arc<dyn Fn(&CrdtUpdate) + Send + Sync>;

#[derive(Clone, Eq, PartialEq, Hash)]
struct DocKey {
    collection: String,
    document_id: String,
}

pub struct CrdtManager {
    replica_id: String,
    docs: RwLock<HashMap<DocKey, Arc<CrdtDocument>>>,
    on_local_change: RwLock<Vec<LocalChangeCallback>>,
}

impl CrdtManager {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            docs: RwLock::new(HashMap::new()),
            on_local_change: RwLock::new(Vec::new()),
        }
    }

    pub fn on_local_change(&self, callback: LocalChangeCallback) {
        self.on_local_change.write().push(callback);
    }

    fn key(collection: &str, document_id: &str) -> DocKey {
        DocKey {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
        }
    }

    fn doc_for(&self, collection: &str, document_id: &str) -> Arc<CrdtDocument> {
        let key = Self::key(collection, document_id);
        if let Some(doc) = self.docs.read().get(&key) {
            return doc.clone();
        }
        let mut docs = self.docs.write();
        docs.entry(key)
            .or_insert_with(|| Arc::new(CrdtDocument::new()))
            .clone()
    }

    fn emit_local_change(&self, collection: &str, document_id: &str, update: Vec<u8>) {
        if update.is_empty() {
            return;
        }
        let envelope = CrdtUpdate {
            document_id: document_id.to_string(),
            collection: collection.to_string(),
            update,
        };
        for callback in self.on_local_change.read().iter() {
            callback(&envelope);
        }
    }

    pub fn set_field(&self, collection: &str, document_id: &str, field: &str, value: &Value) {
        let doc = self.doc_for(collection, document_id);
        let sv_before = doc.state_vector();
        doc.set_field(field, value, Origin::Local);
        let delta = doc
            .incremental_update(Some(&sv_before))
            .unwrap_or_else(|_| doc.full_update());
        self.emit_local_change(collection, document_id, delta);
    }

    pub fn set_fields(
        &self,
        collection: &str,
        document_id: &str,
        fields: &serde_json::Map<String, Value>,
    ) {
        let doc = self.doc_for(collection, document_id);
        let sv_before = doc.state_vector();
        doc.set_fields(fields, Origin::Local);
        let delta = doc
            .incremental_update(Some(&sv_before))
            .unwrap_or_else(|_| doc.full_update());
        self.emit_local_change(collection, document_id, delta);
    }

    pub fn get_field(&self, collection: &str, document_id: &str, field: &str) -> Option<Value> {
        self.doc_for(collection, document_id).get_field(field)
    }

    pub fn get_data(&self, collection: &str, document_id: &str) -> Value {
        self.doc_for(collection, document_id).get_data()
    }

    pub fn get_state(&self, collection: &str, document_id: &str) -> CrdtState {
        let doc = self.doc_for(collection, document_id);
        CrdtState {
            document_id: document_id.to_string(),
            collection: collection.to_string(),
            state_vector: doc.state_vector(),
            full_update: doc.full_update(),
        }
    }

    pub fn get_incremental_update(
        &self,
        collection: &str,
        document_id: &str,
        since_state_vector: Option<&[u8]>,
    ) -> Result<Vec<u8>, CrdtError> {
        self.doc_for(collection, document_id)
            .incremental_update(since_state_vector)
    }

    /// Ingest a remote incremental update. Tagged `remote`; never fires
    /// `onLocalChange`. Leaves the document unchanged on decode failure.
    pub fn apply_update(
        &self,
        collection: &str,
        document_id: &str,
        update: &[u8],
    ) -> Result<(), CrdtError> {
        let doc = self.doc_for(collection, document_id);
        doc.apply_update(update, Origin::Remote).map_err(|_| CrdtError::Decode {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            reason: "corrupt update bytes".to_string(),
        })
    }

    pub fn apply_state(&self, state: &CrdtState) -> Result<(), CrdtError> {
        self.apply_update(&state.collection, &state.document_id, &state.full_update)
    }

    /// `applyState` followed by `getState` — the convenience merge entry
    /// point used by the CRDT conflict-resolution strategy.
    pub fn merge(
        &self,
        collection: &str,
        document_id: &str,
        remote_state: &CrdtState,
    ) -> Result<CrdtState, CrdtError> {
        self.apply_state(remote_state)?;
        Ok(self.get_state(collection, document_id))
    }

    pub fn delete_document(&self, collection: &str, document_id: &str) {
        self.docs.write().remove(&Self::key(collection, document_id));
    }

    pub fn destroy(&self) {
        self.docs.write().clear();
        self.on_local_change.write().clear();
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }
}
