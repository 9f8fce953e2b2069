//! Byte-offset resumable upload protocol, tus-compatible on the wire:
//! server-side session lifecycle in [`server`] and a client-side chunked
//! uploader with local resume bookkeeping in [`client`].

pub mod client;
mod error;
mod server;
mod types;

pub use client::{HttpUploadTransport, MemorySessionBucket, SessionBucket, UploadClient, UploadTransport, DEFAULT_CHUNK_SIZE};
pub use error::{Result, UploadError};
pub use server::UploadManager;
pub use types::{BucketKey, ClientUploadRecord, UploadSession};
