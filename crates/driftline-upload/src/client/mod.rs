pub mod bucket;
pub mod transport;
pub mod uploader;

pub use bucket::{MemorySessionBucket, SessionBucket};
pub use transport::{HttpUploadTransport, UploadTransport};
pub use uploader::{UploadClient, DEFAULT_CHUNK_SIZE};
