//! Rolling encode/decode statistics for one `Codec` instance.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CodecStats {
    pub count: u64,
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    pub avg_encode_ms: f64,
    pub avg_decode_ms: f64,
}

/// Thread-local-ish accumulator: safe to share across threads via `&self`,
/// but each `Codec` owns exactly one and nobody else observes it.
#[derive(Default)]
pub(crate) struct StatsAccumulator(Mutex<Inner>);

#[derive(Default)]
struct Inner {
    count: u64,
    total_original_bytes: u64,
    total_compressed_bytes: u64,
    total_encode_ms: f64,
    total_decode_ms: f64,
    encode_samples: u64,
    decode_samples: u64,
}

impl StatsAccumulator {
    pub fn record_encode(&self, original_len: usize, compressed_len: usize, elapsed_ms: f64) {
        let mut inner = self.0.lock();
        inner.count += 1;
        inner.total_original_bytes += original_len as u64;
        inner.total_compressed_bytes += compressed_len as u64;
        inner.total_encode_ms += elapsed_ms;
        inner.encode_samples += 1;
    }

    pub fn record_decode(&self, elapsed_ms: f64) {
        let mut inner = self.0.lock();
        inner.total_decode_ms += elapsed_ms;
        inner.decode_samples += 1;
    }

    pub fn snapshot(&self) -> CodecStats {
        let inner = self.0.lock();
        CodecStats {
            count: inner.count,
            total_original_bytes: inner.total_original_bytes,
            total_compressed_bytes: inner.total_compressed_bytes,
            avg_encode_ms: if inner.encode_samples > 0 {
                inner.total_encode_ms / inner.encode_samples as f64
            } else {
                0.0
            },
            avg_decode_ms: if inner.decode_samples > 0 {
                inner.total_decode_ms / inner.decode_samples as f64
            } else {
                0.0
            },
        }
    }

    pub fn reset(&self) {
        *self.0.lock() = Inner::default();
    }
}
