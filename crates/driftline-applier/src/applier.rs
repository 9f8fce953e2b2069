//! Server-side Applier: translates a received [`Mutation`] into store
//! operations. Create fails on an existing non-tombstone document; Update
//! fails on a missing one; Delete is always a soft delete.

use std::collections::BTreeMap;
use std::sync::Arc;

use driftline_store::{Document, Selector, StoreBackend, StoreError};
use serde_json::Value;

use crate::error::{ApplierError, Result};
use crate::types::{ApplyOutcome, BatchResult, CollectionInfo, FailedMutation, Mutation, MutationKind};

pub struct Applier {
    store: Arc<dyn StoreBackend>,
}

impl Applier {
    pub fn new(store: Arc<dyn StoreBackend>) -> Self {
        Self { store }
    }

    /// Applies one mutation, translating store-level not-found /
    /// already-exists errors into the Applier's own taxonomy.
    pub fn apply_one(&self, mutation: &Mutation) -> Result<Document> {
        match mutation.kind {
            MutationKind::Create => {
                self.store
                    .insert(&mutation.collection, Some(&mutation.document_id), mutation.data.clone())
                    .map_err(|err| translate(err, &mutation.collection, &mutation.document_id))
            }
            MutationKind::Update => {
                self.store
                    .patch(&mutation.collection, &mutation.document_id, mutation.data.clone())
                    .map_err(|err| translate(err, &mutation.collection, &mutation.document_id))
            }
            MutationKind::Delete => {
                self.store
                    .soft_delete(&mutation.collection, &mutation.document_id)
                    .map_err(|err| translate(err, &mutation.collection, &mutation.document_id))
            }
        }
    }

    /// Applies one mutation, reporting success/failure per item rather than
    /// propagating — used both standalone and as the per-item fallback of
    /// [`Self::apply_batch`].
    pub fn apply(&self, mutation: &Mutation) -> ApplyOutcome {
        match self.apply_one(mutation) {
            Ok(doc) => ApplyOutcome {
                success: true,
                document_id: doc.id,
                rev: Some(doc.rev),
                error: None,
            },
            Err(err) => {
                tracing::warn!(action_id = %mutation.id, error = %err, "applier: mutation failed");
                ApplyOutcome {
                    success: false,
                    document_id: mutation.document_id.clone(),
                    rev: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Groups by collection and attempts a bulk upsert per group inside one
    /// store transaction; if the whole group fails, falls back to per-item
    /// apply so callers still get granular success/failure reporting.
    pub fn apply_batch(&self, mutations: &[Mutation]) -> BatchResult {
        let mut by_collection: BTreeMap<&str, Vec<&Mutation>> = BTreeMap::new();
        for mutation in mutations {
            by_collection.entry(mutation.collection.as_str()).or_default().push(mutation);
        }

        let mut result = BatchResult::default();
        for (collection, group) in by_collection {
            self.apply_group(collection, &group, &mut result);
        }
        result
    }

    fn apply_group(&self, collection: &str, group: &[&Mutation], result: &mut BatchResult) {
        let bulk_attempt = self.store.transaction(&mut || -> driftline_store::Result<()> {
            for mutation in group {
                match mutation.kind {
                    MutationKind::Create => {
                        self.store.insert(&mutation.collection, Some(&mutation.document_id), mutation.data.clone())?;
                    }
                    MutationKind::Update => {
                        self.store.patch(&mutation.collection, &mutation.document_id, mutation.data.clone())?;
                    }
                    MutationKind::Delete => {
                        self.store.soft_delete(&mutation.collection, &mutation.document_id)?;
                    }
                }
            }
            Ok(())
        });

        match bulk_attempt {
            Ok(()) => {
                for mutation in group {
                    result.succeeded.push(mutation.id.clone());
                }
            }
            Err(err) => {
                tracing::debug!(collection, error = %err, "applier: bulk group failed, falling back to per-item apply");
                for mutation in group {
                    let outcome = self.apply(mutation);
                    if outcome.success {
                        result.succeeded.push(mutation.id.clone());
                    } else {
                        result.failed.push(FailedMutation {
                            action_id: mutation.id.clone(),
                            error: outcome.error.unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.store.get(collection, id)?.filter(|d| !d.deleted))
    }

    pub fn list_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let selector = Selector::new().ne("deleted", Value::Bool(true));
        Ok(self.store.find(collection, &selector, None)?)
    }

    pub fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let doc_count = self.store.count(collection)?;
        let update_seq = self
            .store
            .changes(collection, 0, usize::MAX)?
            .last()
            .map(|c| c.seq)
            .unwrap_or(0);
        Ok(CollectionInfo { doc_count, update_seq })
    }
}

fn translate(err: StoreError, collection: &str, document_id: &str) -> ApplierError {
    match err {
        StoreError::DocumentAlreadyExists { .. } => ApplierError::DocumentAlreadyExists {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
        },
        StoreError::DocumentNotFound { .. } => ApplierError::DocumentNotFound {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
        },
        other => ApplierError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use driftline_store::MemoryStore;
    use serde_json::json;

    use super::*;

    fn applier() -> Applier {
        Applier::new(Arc::new(MemoryStore::new()))
    }

    fn mutation(kind: MutationKind, id: &str, data: Value) -> Mutation {
        Mutation {
            id: format!("a-{id}"),
            kind,
            collection: "todos".to_string(),
            document_id: id.to_string(),
            data,
            timestamp: 1,
        }
    }

    #[test]
    fn create_succeeds_on_new_document() {
        let applier = applier();
        let outcome = applier.apply(&mutation(MutationKind::Create, "t1", json!({"text": "Buy milk"})));
        assert!(outcome.success);
        assert_eq!(outcome.document_id, "t1");
    }

    #[test]
    fn create_on_existing_document_fails_with_already_exists() {
        let applier = applier();
        applier.apply_one(&mutation(MutationKind::Create, "t1", json!({}))).unwrap();
        let err = applier.apply_one(&mutation(MutationKind::Create, "t1", json!({}))).unwrap_err();
        assert!(matches!(err, ApplierError::DocumentAlreadyExists { .. }));
    }

    #[test]
    fn update_on_missing_document_fails_with_not_found() {
        let applier = applier();
        let err = applier.apply_one(&mutation(MutationKind::Update, "missing", json!({}))).unwrap_err();
        assert!(matches!(err, ApplierError::DocumentNotFound { .. }));
    }

    #[test]
    fn update_merges_over_existing_data() {
        let applier = applier();
        applier.apply_one(&mutation(MutationKind::Create, "t1", json!({"text": "a", "completed": false}))).unwrap();
        let doc = applier.apply_one(&mutation(MutationKind::Update, "t1", json!({"completed": true}))).unwrap();
        assert_eq!(doc.data["text"], json!("a"));
        assert_eq!(doc.data["completed"], json!(true));
    }

    #[test]
    fn delete_is_a_soft_delete() {
        let applier = applier();
        applier.apply_one(&mutation(MutationKind::Create, "t1", json!({}))).unwrap();
        let doc = applier.apply_one(&mutation(MutationKind::Delete, "t1", json!({}))).unwrap();
        assert!(doc.deleted);

        let visible = applier.get_document("todos", "t1").unwrap();
        assert!(visible.is_none());
    }

    #[test]
    fn batch_bulk_path_succeeds_when_all_items_are_valid() {
        let applier = applier();
        let mutations = vec![
            mutation(MutationKind::Create, "t1", json!({})),
            mutation(MutationKind::Create, "t2", json!({})),
        ];
        let result = applier.apply_batch(&mutations);
        assert_eq!(result.succeeded.len(), 2);
        assert!(result.failed.is_empty());
    }

    #[test]
    fn batch_falls_back_to_per_item_when_one_item_conflicts() {
        let applier = applier();
        applier.apply_one(&mutation(MutationKind::Create, "t1", json!({}))).unwrap();

        let mutations = vec![
            mutation(MutationKind::Create, "t1", json!({})), // conflicts: already exists
            mutation(MutationKind::Create, "t2", json!({})),
        ];
        let result = applier.apply_batch(&mutations);
        assert_eq!(result.succeeded, vec!["a-t2".to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].action_id, "a-t1");
    }

    #[test]
    fn batch_fallback_does_not_replay_a_bulk_write_that_already_landed() {
        let applier = applier();
        applier.apply_one(&mutation(MutationKind::Create, "t2", json!({}))).unwrap();

        let mutations = vec![
            mutation(MutationKind::Create, "t1", json!({})), // new: bulk writes it before hitting the conflict
            mutation(MutationKind::Create, "t2", json!({})), // conflicts: already exists
        ];
        let result = applier.apply_batch(&mutations);
        assert_eq!(result.succeeded, vec!["a-t1".to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].action_id, "a-t2");
    }

    #[test]
    fn batch_groups_are_independent_across_collections() {
        let applier = applier();
        let mut m1 = mutation(MutationKind::Create, "t1", json!({}));
        m1.collection = "todos".to_string();
        let mut m2 = mutation(MutationKind::Create, "p1", json!({}));
        m2.collection = "products".to_string();

        let result = applier.apply_batch(&[m1, m2]);
        assert_eq!(result.succeeded.len(), 2);
    }
}
