use serde_json::Value;

use crate::error::Result;
use crate::types::{ChangeRecord, Document, Selector};

/// The external store contract assumed by the rest of the core.
///
/// Implementations provide per-collection storage with a monotonic change
/// feed; everything above this trait only ever sees `Document` values and
/// never reaches into how they're persisted.
pub trait StoreBackend: Send + Sync {
    fn insert(&self, collection: &str, id: Option<&str>, data: Value) -> Result<Document>;

    fn find_one(&self, collection: &str, field: &str, value: &Value) -> Result<Option<Document>>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    fn find(&self, collection: &str, selector: &Selector, limit: Option<usize>) -> Result<Vec<Document>>;

    /// Merge `partial` over the existing document's `data`, preserving the
    /// version handle and refreshing `updated_at`.
    fn patch(&self, collection: &str, id: &str, partial: Value) -> Result<Document>;

    fn bulk_insert(&self, collection: &str, docs: Vec<(Option<String>, Value)>) -> Result<Vec<Document>>;

    fn soft_delete(&self, collection: &str, id: &str) -> Result<Document>;

    fn changes(&self, collection: &str, since: i64, limit: usize) -> Result<Vec<ChangeRecord>>;

    fn count(&self, collection: &str) -> Result<usize>;

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}
