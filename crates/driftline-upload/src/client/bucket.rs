//! The client's local key-value bucket for in-progress upload sessions,
//! keyed by content-type + size so a restarted process can find a matching
//! session to resume instead of starting a fresh upload.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::types::{BucketKey, ClientUploadRecord};

/// Abstraction over wherever session metadata actually lives — an
/// in-memory map in tests, a small JSON file or embedded KV store in a real
/// client. Mirrors the store's own trait-object-over-backend split.
pub trait SessionBucket: Send + Sync {
    fn get(&self, key: &BucketKey) -> Option<ClientUploadRecord>;
    fn put(&self, key: BucketKey, record: ClientUploadRecord);
    fn remove(&self, key: &BucketKey);
}

#[derive(Default)]
pub struct MemorySessionBucket {
    records: Mutex<HashMap<BucketKey, ClientUploadRecord>>,
}

impl MemorySessionBucket {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBucket for MemorySessionBucket {
    fn get(&self, key: &BucketKey) -> Option<ClientUploadRecord> {
        self.records.lock().get(key).cloned()
    }

    fn put(&self, key: BucketKey, record: ClientUploadRecord) {
        self.records.lock().insert(key, record);
    }

    fn remove(&self, key: &BucketKey) {
        self.records.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let bucket = MemorySessionBucket::new();
        let key = BucketKey::new("image/png", 1024);
        let record = ClientUploadRecord {
            session_id: "s1".to_string(),
            url: "http://localhost/api/tus/s1".to_string(),
            total_size: 1024,
            bytes_sent: 512,
            content_type: "image/png".to_string(),
        };
        bucket.put(key.clone(), record.clone());
        assert_eq!(bucket.get(&key), Some(record));

        bucket.remove(&key);
        assert_eq!(bucket.get(&key), None);
    }
}
