//! Store-facing document shape. The full tree of `data` stays an opaque
//! `serde_json::Value` — only the codec needs its exact shape; the store
//! and everything above it treats it as a black box plus the typed
//! accessors below (per Design Notes: dynamic "any" records become an
//! opaque value plus typed accessors).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
    /// Opaque store version handle, passed back on update but never
    /// interpreted by the core.
    pub rev: String,
    pub data: Value,
}

impl Document {
    pub fn now_iso() -> String {
        Utc::now().to_rfc3339()
    }

    pub fn next_rev(previous: Option<&str>) -> String {
        let n: u64 = previous
            .and_then(|r| r.split('-').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        format!("{}-{}", n + 1, uuid::Uuid::new_v4().simple())
    }
}

/// A single entry in the store's change feed, consumed by the sync pull
/// path and by the real-time broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub seq: i64,
    pub collection: String,
    pub id: String,
    pub deleted: bool,
    pub doc: Document,
}

/// A minimal Mango-style selector: field name to either a literal value
/// (equality) or a `{ "$ne": value }` / `{ "$eq": value }` operator object.
#[derive(Debug, Clone, Default)]
pub struct Selector(pub Vec<(String, SelectorOp)>);

#[derive(Debug, Clone)]
pub enum SelectorOp {
    Eq(Value),
    Ne(Value),
}

impl Selector {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.push((field.into(), SelectorOp::Eq(value)));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.push((field.into(), SelectorOp::Ne(value)));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(field, op)| {
            let actual = field_value(doc, field);
            match op {
                SelectorOp::Eq(expected) => actual.as_ref() == Some(expected),
                SelectorOp::Ne(expected) => actual.as_ref() != Some(expected),
            }
        })
    }
}

fn field_value(doc: &Document, field: &str) -> Option<Value> {
    match field {
        "id" => Some(Value::String(doc.id.clone())),
        "deleted" => Some(Value::Bool(doc.deleted)),
        "createdAt" => Some(Value::String(doc.created_at.clone())),
        "updatedAt" => Some(Value::String(doc.updated_at.clone())),
        other => doc.data.get(other).cloned(),
    }
}
