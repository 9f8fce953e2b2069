//! Wire codec: MessagePack + DEFLATE, with a JSON fallback and a base64
//! text framing for transports that cannot carry raw bytes.
//!
//! Encode path: `serde_json::Value` -> MessagePack (`rmp-serde`) -> DEFLATE
//! (`flate2`). Decode reverses, but tries inflate first and falls back to
//! treating the input as uncompressed MessagePack if inflation fails, for
//! best-effort interop with peers that sent uncompressed payloads.

mod error;
mod stats;

pub use error::CodecError;
pub use stats::CodecStats;

use std::io::{Read, Write};
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::Value;
use stats::StatsAccumulator;

pub type Result<T> = std::result::Result<T, CodecError>;

/// Content type reported for the binary+compressed wire format.
pub const CONTENT_TYPE_MSGPACK_DEFLATE: &str = "application/msgpack+deflate";
/// Content type reported when falling back to plain JSON.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Header value signalling msgpack+deflate framing.
pub const COMPRESSION_HEADER_VALUE: &str = "msgpack-deflate";

#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// Use MessagePack instead of the JSON fallback.
    pub use_binary: bool,
    /// DEFLATE-compress the MessagePack payload.
    pub use_compression: bool,
    /// DEFLATE level, 0-9.
    pub compression_level: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            use_binary: true,
            use_compression: true,
            compression_level: 6,
        }
    }
}

/// A single encoder/decoder with its own rolling stats.
pub struct Codec {
    options: CodecOptions,
    stats: StatsAccumulator,
}

impl Codec {
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            stats: StatsAccumulator::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CodecOptions::default())
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// The content type this codec reports for its encoded output.
    pub fn content_type(&self) -> &'static str {
        if self.options.use_binary {
            CONTENT_TYPE_MSGPACK_DEFLATE
        } else {
            CONTENT_TYPE_JSON
        }
    }

    /// Whether the `X-Compression` header should be attached to output of
    /// `encode`.
    pub fn compression_header(&self) -> Option<&'static str> {
        if self.options.use_binary && self.options.use_compression {
            Some(COMPRESSION_HEADER_VALUE)
        } else {
            None
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let start = Instant::now();

        let raw = if self.options.use_binary {
            rmp_serde::to_vec_named(value)
                .map_err(|e| CodecError::Serialization(e.to_string()))?
        } else {
            serde_json::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))?
        };

        let out = if self.options.use_binary && self.options.use_compression {
            deflate(&raw, self.options.compression_level)?
        } else {
            raw
        };

        let canonical_len = canonical_json_len(value);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stats.record_encode(canonical_len, out.len(), elapsed_ms);

        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let start = Instant::now();

        let value = if self.options.use_binary {
            let raw = if self.options.use_compression {
                inflate_or_passthrough(bytes)
            } else {
                bytes.to_vec()
            };
            rmp_serde::from_slice(&raw).map_err(|e| CodecError::Decode(e.to_string()))?
        } else {
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stats.record_decode(elapsed_ms);

        Ok(value)
    }

    /// Base64 text framing of `encode`, for transports that can't carry
    /// raw bytes (e.g. JSON fields, query parameters).
    pub fn encode_base64(&self, value: &Value) -> Result<String> {
        Ok(STANDARD.encode(self.encode(value)?))
    }

    pub fn decode_base64(&self, text: &str) -> Result<Value> {
        let bytes = STANDARD
            .decode(text)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        self.decode(&bytes)
    }

    pub fn stats(&self) -> CodecStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

fn canonical_json_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

fn deflate(raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(raw)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Attempt to inflate; on failure, assume the bytes were never compressed
/// (best-effort interop with peers that didn't compress).
fn inflate_or_passthrough(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) if !out.is_empty() || bytes.is_empty() => out,
        _ => bytes.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_binary_compressed() {
        let codec = Codec::with_defaults();
        let value = json!({"id": "t1", "text": "Buy milk", "completed": false});
        let encoded = codec.encode(&value).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trips_json_fallback() {
        let codec = Codec::new(CodecOptions {
            use_binary: false,
            use_compression: false,
            compression_level: 6,
        });
        let value = json!({"a": 1, "b": [1, 2, 3]});
        let encoded = codec.encode(&value).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn content_type_reflects_options() {
        let binary = Codec::with_defaults();
        assert_eq!(binary.content_type(), CONTENT_TYPE_MSGPACK_DEFLATE);
        assert_eq!(binary.compression_header(), Some(COMPRESSION_HEADER_VALUE));

        let json_codec = Codec::new(CodecOptions {
            use_binary: false,
            use_compression: false,
            compression_level: 6,
        });
        assert_eq!(json_codec.content_type(), CONTENT_TYPE_JSON);
        assert_eq!(json_codec.compression_header(), None);
    }

    #[test]
    fn decode_falls_back_to_uncompressed_on_bad_inflate() {
        let codec = Codec::with_defaults();
        let uncompressed = Codec::new(CodecOptions {
            use_binary: true,
            use_compression: false,
            compression_level: 6,
        });
        let value = json!({"x": 1});
        let raw = uncompressed.encode(&value).unwrap();
        // codec expects compressed input but gets raw msgpack bytes
        let decoded = codec.decode(&raw).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_corrupt_input_fails() {
        let codec = Codec::new(CodecOptions {
            use_binary: false,
            use_compression: false,
            compression_level: 6,
        });
        let err = codec.decode(b"not json{{{").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn stats_accumulate_and_reset() {
        let codec = Codec::with_defaults();
        let value = json!({"a": 1});
        codec.encode(&value).unwrap();
        codec.encode(&value).unwrap();
        let encoded = codec.encode(&value).unwrap();
        codec.decode(&encoded).unwrap();

        let stats = codec.stats();
        assert_eq!(stats.count, 3);
        assert!(stats.total_original_bytes > 0);
        assert!(stats.total_compressed_bytes > 0);

        codec.reset_stats();
        let stats = codec.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_encode_ms, 0.0);
    }

    #[test]
    fn compression_ratio_on_realistic_batch_is_reasonable() {
        let codec = Codec::with_defaults();
        let actions: Vec<Value> = (0..50)
            .map(|i| {
                json!({
                    "id": format!("action-{i}"),
                    "kind": "create",
                    "collection": "todos",
                    "documentId": format!("t{i}"),
                    "data": {"text": "Buy milk and eggs for breakfast", "completed": false},
                    "timestamp": 1_700_000_000_000i64 + i,
                })
            })
            .collect();
        let batch = json!({"actions": actions});

        let original_len = serde_json::to_vec(&batch).unwrap().len();
        let compressed = codec.encode(&batch).unwrap();

        assert!(
            (compressed.len() as f64) / (original_len as f64) <= 0.8,
            "expected compression ratio <= 0.8, got {} / {}",
            compressed.len(),
            original_len
        );
    }

    #[test]
    fn base64_framing_round_trips() {
        let codec = Codec::with_defaults();
        let value = json!({"hello": "world"});
        let text = codec.encode_base64(&value).unwrap();
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
        let decoded = codec.decode_base64(&text).unwrap();
        assert_eq!(decoded, value);
    }
}
