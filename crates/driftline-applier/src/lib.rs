//! Server-side transactional apply of remote mutations: Create/Update/Delete
//! against the local store, with a bulk-then-per-item-fallback batch path.

mod applier;
mod error;
mod types;

pub use applier::Applier;
pub use error::{ApplierError, Result};
pub use types::{ApplyOutcome, BatchResult, CollectionInfo, FailedMutation, Mutation, MutationKind};
