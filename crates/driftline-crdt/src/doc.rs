//! A single CRDT document: one `yrs::Doc` with a root map of fields.

use std::collections::HashMap;

use serde_json::Value;
use yrs::{Array, ArrayPrelim, ArrayRef, Map, MapPrelim, MapRef, ReadTxn, StateVector, Transact, TransactionMut, Update};

use crate::error::CrdtError;
use crate::json::{any_to_json, json_to_any};
use crate::types::Origin;

const ROOT_MAP: &str = "fields";

pub struct CrdtDocument {
    doc: yrs::Doc,
    root: MapRef,
}

impl CrdtDocument {
    pub fn new() -> Self {
        let doc = yrs::Doc::new();
        let root = doc.get_or_insert_map(ROOT_MAP);
        Self { doc, root }
    }

    fn transact_origin(&self, origin: Origin) -> TransactionMut<'_> {
        self.doc.transact_mut_with(origin.tag())
    }

    /// Write one field. Writing `Value::Null` deletes the field. Object and
    /// array values recurse into real nested `MapRef`/`ArrayRef` shared
    /// types rather than being frozen into one atomic register, so a
    /// concurrent edit to a sibling key of a nested object still merges.
    pub fn set_field(&self, field: &str, value: &Value, origin: Origin) {
        let mut txn = self.transact_origin(origin);
        write_field(&mut txn, &self.root, field, value);
    }

    /// Write several fields as a single transaction.
    pub fn set_fields(&self, fields: &serde_json::Map<String, Value>, origin: Origin) {
        let mut txn = self.transact_origin(origin);
        for (field, value) in fields {
            write_field(&mut txn, &self.root, field, value);
        }
    }

    pub fn get_field(&self, field: &str) -> Option<Value> {
        let txn = self.doc.transact();
        self.root.get(&txn, field).map(|v| yrs_value_to_json(&txn, &v))
    }

    pub fn get_data(&self) -> Value {
        let txn = self.doc.transact();
        let mut out = serde_json::Map::new();
        for (key, value) in self.root.iter(&txn) {
            out.insert(key.to_string(), yrs_value_to_json(&txn, &value));
        }
        Value::Object(out)
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    pub fn full_update(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Minimal delta since `since`, or the full update if `since` is absent.
    pub fn incremental_update(&self, since: Option<&[u8]>) -> Result<Vec<u8>, CrdtError> {
        match since {
            None => Ok(self.full_update()),
            Some(bytes) => {
                let sv = StateVector::decode_v1(bytes).map_err(|e| CrdtError::Decode {
                    collection: String::new(),
                    document_id: String::new(),
                    reason: e.to_string(),
                })?;
                Ok(self.doc.transact().encode_state_as_update_v1(&sv))
            }
        }
    }

    pub fn apply_update(&self, update: &[u8], origin: Origin) -> Result<(), CrdtError> {
        let decoded = Update::decode_v1(update).map_err(|e| CrdtError::Decode {
            collection: String::new(),
            document_id: String::new(),
            reason: e.to_string(),
        })?;
        let mut txn = self.transact_origin(origin);
        txn.apply_update(decoded).map_err(|e| CrdtError::Decode {
            collection: String::new(),
            document_id: String::new(),
            reason: e.to_string(),
        })
    }
}

impl Default for CrdtDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `value` under `key` into any `yrs` map-like target (the document
/// root, or a nested `MapRef`). `Null` deletes.
///
/// Object values reuse the `MapRef` already sitting at `key`, if there is
/// one, reconciling it key-by-key rather than replacing it with a fresh map
/// — this is what lets two replicas that both descend from the same nested
/// map edit different keys of it concurrently and have both survive a
/// merge, instead of one writer's whole-object assignment clobbering the
/// other's. Arrays are simpler sequences and are replaced wholesale.
fn write_field<M: Map>(txn: &mut TransactionMut, target: &M, key: &str, value: &Value) {
    match value {
        Value::Null => {
            target.remove(txn, key);
        }
        Value::Object(map) => {
            let nested = match target.get(&*txn, key) {
                Some(yrs::Value::YMap(existing)) => existing,
                _ => target.insert(txn, key, MapPrelim::from(Vec::<(String, yrs::Any)>::new())),
            };
            reconcile_map(txn, &nested, map);
        }
        Value::Array(items) => {
            target.remove(txn, key);
            let nested: ArrayRef = target.insert(txn, key, ArrayPrelim::from(Vec::<yrs::Any>::new()));
            for item in items {
                push_item(txn, &nested, item);
            }
        }
        scalar => {
            target.insert(txn, key, json_to_any(scalar));
        }
    }
}

/// Make `target`'s keys match `desired` exactly: remove keys `desired`
/// doesn't mention, then write every key `desired` does. Keys neither side
/// touches are untouched, which is what preserves a concurrent sibling
/// write across a merge.
fn reconcile_map(txn: &mut TransactionMut, target: &MapRef, desired: &serde_json::Map<String, Value>) {
    let stale: Vec<String> = target
        .iter(&*txn)
        .map(|(k, _)| k.to_string())
        .filter(|k| !desired.contains_key(k))
        .collect();
    for key in stale {
        target.remove(txn, &key);
    }
    for (key, value) in desired {
        write_field(txn, target, key, value);
    }
}

/// Append `value` to a nested array, recursing the same way `write_field`
/// does for map entries.
fn push_item(txn: &mut TransactionMut, target: &ArrayRef, value: &Value) {
    match value {
        Value::Object(map) => {
            let nested: MapRef = target.push_back(txn, MapPrelim::from(Vec::<(String, yrs::Any)>::new()));
            for (k, v) in map {
                write_field(txn, &nested, k, v);
            }
        }
        Value::Array(items) => {
            let nested: ArrayRef = target.push_back(txn, ArrayPrelim::from(Vec::<yrs::Any>::new()));
            for item in items {
                push_item(txn, &nested, item);
            }
        }
        scalar => {
            target.push_back(txn, json_to_any(scalar));
        }
    }
}

fn yrs_value_to_json<T: ReadTxn>(txn: &T, value: &yrs::Value) -> Value {
    match value {
        yrs::Value::Any(any) => any_to_json(any),
        yrs::Value::YMap(map) => {
            let mut obj = serde_json::Map::new();
            for (key, v) in map.iter(txn) {
                obj.insert(key.to_string(), yrs_value_to_json(txn, &v));
            }
            Value::Object(obj)
        }
        yrs::Value::YArray(arr) => Value::Array(arr.iter(txn).map(|v| yrs_value_to_json(txn, &v)).collect()),
        // Any other shared-type leaf (text/xml) should not occur here; we
        // never insert one. Serialize as its JSON string form rather than
        // panic if `yrs` ever surprises us.
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

/// Build a brand-new document by replaying a full update from scratch, then
/// materialize it as a plain mapping — used by `merge` and by applier-style
/// consumers that only need the resulting data, not the live document.
pub fn materialize_update(update: &[u8]) -> Result<HashMap<String, Value>, CrdtError> {
    let doc = CrdtDocument::new();
    doc.apply_update(update, Origin::Remote)?;
    match doc.get_data() {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Ok(HashMap::new()),
    }
}
