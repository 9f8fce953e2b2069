mod error;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;
mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::StoreBackend;
pub use types::{ChangeRecord, Document, Selector, SelectorOp};
