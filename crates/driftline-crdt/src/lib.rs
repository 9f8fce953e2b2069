//! Per-document field-level CRDT state, built on `yrs`.
//!
//! `CrdtManager` is the sole owner of every in-memory `yrs::Doc` for a
//! replica; callers never touch a `yrs` type directly.

mod doc;
mod error;
mod json;
mod manager;
mod types;

pub use doc::{materialize_update, CrdtDocument};
pub use error::CrdtError;
pub use manager::{CrdtManager, LocalChangeCallback};
pub use types::{CrdtState, CrdtUpdate, Origin};
