//! Pure in-memory `StoreBackend`, used by unit tests and by the sync-engine
//! test harness. Mirrors the `HashMap`-backed texture of
//! `less_db::storage::memory_mapped::MemoryMapped`.

use std::cell::RefCell;
use std::collections::HashMap;

use parking_lot::ReentrantMutex;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::types::{ChangeRecord, Document, Selector};
use crate::traits::StoreBackend;

struct Inner {
    // collection -> (id -> document)
    collections: HashMap<String, HashMap<String, Document>>,
    // collection -> append-only change log
    changes: HashMap<String, Vec<ChangeRecord>>,
    next_seq: i64,
}

pub struct MemoryStore {
    // `ReentrantMutex` lets `transaction()` call back into `self` methods
    // from the same thread without deadlocking.
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                collections: HashMap::new(),
                changes: HashMap::new(),
                next_seq: 1,
            })),
        }
    }

    fn record_change(inner: &mut Inner, collection: &str, doc: &Document) {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .changes
            .entry(collection.to_string())
            .or_default()
            .push(ChangeRecord {
                seq,
                collection: collection.to_string(),
                id: doc.id.clone(),
                deleted: doc.deleted,
                doc: doc.clone(),
            });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for MemoryStore {
    fn insert(&self, collection: &str, id: Option<&str>, data: Value) -> Result<Document> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Some(existing) = inner
            .collections
            .get(collection)
            .and_then(|c| c.get(&id))
        {
            if !existing.deleted {
                return Err(StoreError::DocumentAlreadyExists {
                    collection: collection.to_string(),
                    id,
                });
            }
        }

        let now = Document::now_iso();
        let doc = Document {
            id: id.clone(),
            collection: collection.to_string(),
            created_at: now.clone(),
            updated_at: now,
            deleted: false,
            rev: Document::next_rev(None),
            data,
        };

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc.clone());
        Self::record_change(&mut inner, collection, &doc);

        Ok(doc)
    }

    fn find_one(&self, collection: &str, field: &str, value: &Value) -> Result<Option<Document>> {
        let selector = Selector::new().eq(field, value.clone());
        Ok(self.find(collection, &selector, Some(1))?.into_iter().next())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        Ok(inner.collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    fn find(&self, collection: &str, selector: &Selector, limit: Option<usize>) -> Result<Vec<Document>> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let mut results: Vec<Document> = inner
            .collections
            .get(collection)
            .map(|c| c.values().filter(|d| selector.matches(d)).cloned().collect())
            .unwrap_or_default();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn patch(&self, collection: &str, id: &str, partial: Value) -> Result<Document> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        let existing = inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let merged_data = merge_json(&existing.data, &partial);
        let updated = Document {
            updated_at: Document::now_iso(),
            rev: Document::next_rev(Some(&existing.rev)),
            data: merged_data,
            ..existing
        };

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), updated.clone());
        Self::record_change(&mut inner, collection, &updated);

        Ok(updated)
    }

    fn bulk_insert(&self, collection: &str, docs: Vec<(Option<String>, Value)>) -> Result<Vec<Document>> {
        docs.into_iter()
            .map(|(id, data)| self.insert(collection, id.as_deref(), data))
            .collect()
    }

    fn soft_delete(&self, collection: &str, id: &str) -> Result<Document> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let existing = inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let updated = Document {
            deleted: true,
            updated_at: Document::now_iso(),
            rev: Document::next_rev(Some(&existing.rev)),
            ..existing
        };
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), updated.clone());
        Self::record_change(&mut inner, collection, &updated);
        Ok(updated)
    }

    fn changes(&self, collection: &str, since: i64, limit: usize) -> Result<Vec<ChangeRecord>> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        Ok(inner
            .changes
            .get(collection)
            .map(|log| {
                log.iter()
                    .filter(|c| c.seq > since)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.values().filter(|d| !d.deleted).count())
            .unwrap_or(0))
    }

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let guard = self.inner.lock();
        let snapshot = {
            let inner = guard.borrow();
            (inner.collections.clone(), inner.changes.clone(), inner.next_seq)
        };
        match f() {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut inner = guard.borrow_mut();
                inner.collections = snapshot.0;
                inner.changes = snapshot.1;
                inner.next_seq = snapshot.2;
                Err(err)
            }
        }
    }
}

fn merge_json(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in patch_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => patch.clone(),
    }
}
