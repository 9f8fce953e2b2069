//! Wire transport for the push/pull protocol. Abstracted behind a trait so
//! the engine can be driven by an in-process mock in tests without any
//! network I/O.

use async_trait::async_trait;
use driftline_vclock::VectorClock;

use crate::error::{Result, SyncError};
use crate::types::{PullResponse, PushRequest, PushResponse};

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, url: &str, request: &PushRequest) -> Result<PushResponse>;

    async fn pull(
        &self,
        url: &str,
        since: i64,
        vector_clock: &VectorClock,
        client_id: &str,
        limit: usize,
    ) -> Result<PullResponse>;
}

/// `reqwest`-backed transport, compressing request bodies with the
/// engine's codec and honouring the `Accept`/`X-Compression` framing from
/// the HTTP surface contract.
pub struct HttpTransport {
    client: reqwest::Client,
    codec: driftline_codec::Codec,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(codec_options: driftline_codec::CodecOptions, headers: Vec<(String, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            codec: driftline_codec::Codec::new(codec_options),
            headers,
        }
    }

    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn push(&self, url: &str, request: &PushRequest) -> Result<PushResponse> {
        let body = serde_json::to_value(request)?;
        let encoded = self.codec.encode(&body)?;

        let mut builder = self.client.post(format!("{url}/push")).body(encoded);
        builder = builder.header("Content-Type", self.codec.content_type());
        if let Some(header) = self.codec.compression_header() {
            builder = builder.header("X-Compression", header);
        }
        builder = self.apply_headers(builder);

        let response = builder.send().await.map_err(|e| SyncError::Network(e.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| SyncError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(SyncError::Protocol(format!("push failed with status {status}")));
        }
        let decoded = self.codec.decode(&bytes)?;
        Ok(serde_json::from_value(decoded)?)
    }

    async fn pull(
        &self,
        url: &str,
        since: i64,
        vector_clock: &VectorClock,
        client_id: &str,
        limit: usize,
    ) -> Result<PullResponse> {
        let vc_param = serde_json::to_string(vector_clock)?;
        let mut builder = self.client.get(format!("{url}/pull")).query(&[
            ("since", since.to_string()),
            ("limit", limit.to_string()),
            ("vectorClock", vc_param),
            ("clientId", client_id.to_string()),
        ]);
        builder = self.apply_headers(builder);

        let response = builder.send().await.map_err(|e| SyncError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Protocol(format!("pull failed with status {status}")));
        }
        let pull: PullResponse = response.json().await.map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(pull)
    }
}
