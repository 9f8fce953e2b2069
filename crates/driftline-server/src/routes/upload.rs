//! `/api/tus/*` — tus-compatible resumable upload protocol: session
//! lifecycle headers rather than JSON bodies for HEAD/PATCH, matching the
//! wire sketch.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::state::AppState;

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUploadRequest>,
) -> Result<Response> {
    let session = state.uploads.create(request.total_size, request.metadata).await?;
    let location = format!("/api/tus/{}", session.id);
    let mut response = (StatusCode::CREATED, Json(session)).into_response();
    response
        .headers_mut()
        .insert("Location", HeaderValue::from_str(&location).unwrap());
    Ok(response)
}

pub async fn head(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response> {
    let session = state.uploads.head(&id)?;
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("Upload-Offset", HeaderValue::from_str(&session.offset.to_string()).unwrap());
    headers.insert("Upload-Length", HeaderValue::from_str(&session.total_size.to_string()).unwrap());
    Ok(response)
}

pub async fn patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let offset = header_u64(&headers, "upload-offset")
        .ok_or_else(|| ApiError::Protocol("missing Upload-Offset header".to_string()))?;

    let session = state.uploads.patch(&id, offset, &body).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    let out_headers = response.headers_mut();
    out_headers.insert("Upload-Offset", HeaderValue::from_str(&session.offset.to_string()).unwrap());
    Ok(response)
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode> {
    state.uploads.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let session = state.uploads.head(&id)?;
    Ok(Json(serde_json::to_value(session).unwrap_or(json!(null))))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "sessions": state.uploads.list() }))
}
