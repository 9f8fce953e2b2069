//! Conflict detection and resolution: whole-document LWW, field-level
//! merge, field-level LWW, and CRDT merge. Pure given its inputs — the
//! only I/O is fetching the server document when the caller didn't supply
//! one inline (see [`Arbiter`]).

mod arbiter;
mod error;
mod types;

pub use arbiter::Arbiter;
pub use error::{ArbiterError, Result};
pub use types::{
    ConflictCheck, CrdtResolveInput, CrdtResolveResult, DocVersion, FieldConflict, ResolveInput,
    ResolveResult, Winner,
};
