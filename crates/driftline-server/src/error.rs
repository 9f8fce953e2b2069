//! Maps the union of crate errors onto the §7 taxonomy: HTTP status code
//! plus a `{error, kind}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] driftline_store::StoreError),

    #[error(transparent)]
    Applier(#[from] driftline_applier::ApplierError),

    #[error(transparent)]
    Arbiter(#[from] driftline_arbiter::ArbiterError),

    #[error(transparent)]
    Codec(#[from] driftline_codec::CodecError),

    #[error(transparent)]
    Upload(#[from] driftline_upload::UploadError),

    #[error("malformed request: {0}")]
    Protocol(String),

    #[error("not found")]
    NotFound,
}

impl ApiError {
    fn kind_and_status(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Store(driftline_store::StoreError::DocumentNotFound { .. }) => {
                ("DocumentNotFound", StatusCode::NOT_FOUND)
            }
            ApiError::Store(driftline_store::StoreError::DocumentAlreadyExists { .. }) => {
                ("DocumentAlreadyExists", StatusCode::CONFLICT)
            }
            ApiError::Store(driftline_store::StoreError::UniqueConstraint { .. }) => {
                ("DocumentAlreadyExists", StatusCode::CONFLICT)
            }
            ApiError::Store(_) => ("StoreError", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Applier(driftline_applier::ApplierError::DocumentNotFound { .. }) => {
                ("DocumentNotFound", StatusCode::NOT_FOUND)
            }
            ApiError::Applier(driftline_applier::ApplierError::DocumentAlreadyExists { .. }) => {
                ("DocumentAlreadyExists", StatusCode::CONFLICT)
            }
            ApiError::Applier(_) => ("StoreError", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Arbiter(driftline_arbiter::ArbiterError::Crdt(
                driftline_crdt::CrdtError::Decode { .. },
            )) => ("CRDTDecodeError", StatusCode::BAD_REQUEST),
            ApiError::Arbiter(driftline_arbiter::ArbiterError::Crdt(
                driftline_crdt::CrdtError::NotFound { .. },
            )) => ("DocumentNotFound", StatusCode::NOT_FOUND),
            ApiError::Arbiter(_) => ("StoreError", StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Codec(_) => ("DecodeError", StatusCode::BAD_REQUEST),
            ApiError::Upload(driftline_upload::UploadError::SessionNotFound(_)) => {
                ("NotFound", StatusCode::NOT_FOUND)
            }
            ApiError::Upload(driftline_upload::UploadError::OffsetMismatch { .. }) => {
                ("OffsetMismatch", StatusCode::CONFLICT)
            }
            ApiError::Upload(driftline_upload::UploadError::SessionExpired(_)) => {
                ("SessionExpired", StatusCode::GONE)
            }
            ApiError::Upload(_) => ("ProtocolError", StatusCode::BAD_REQUEST),
            ApiError::Protocol(_) => ("ProtocolError", StatusCode::BAD_REQUEST),
            ApiError::NotFound => ("NotFound", StatusCode::NOT_FOUND),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, status) = self.kind_and_status();
        tracing::warn!(error = %self, kind, "request failed");
        (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
