//! HTTP + WebSocket gateway binding the sync/applier/arbiter/upload/realtime
//! crates to the wire surface: axum `Router`, CORS, and the shared
//! [`AppState`].

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub use config::ServerConfig;
pub use state::AppState;

const ALLOWED_HEADERS: &[&str] = &[
    "content-type",
    "authorization",
    "x-client-id",
    "x-request-id",
    "upload-offset",
    "upload-length",
    "upload-metadata",
    "upload-defer-length",
];

const EXPOSED_HEADERS: &[&str] = &["location", "upload-offset", "upload-length", "x-request-id"];

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::HEAD, Method::OPTIONS])
        .allow_headers(ALLOWED_HEADERS.iter().map(|h| h.parse::<HeaderName>().unwrap()).collect::<Vec<_>>())
        .expose_headers(EXPOSED_HEADERS.iter().map(|h| h.parse::<HeaderName>().unwrap()).collect::<Vec<_>>());

    layer = if config.cors_origin == "*" {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        layer.allow_origin(
            config
                .cors_origin
                .split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
    };

    if config.cors_credentials && config.cors_origin != "*" {
        layer = layer.allow_credentials(true);
    }
    layer
}

/// Wires every route module onto a single `Router` over the shared state.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let sync_routes = Router::new()
        .route("/api/sync/push", post(routes::sync::push))
        .route("/api/sync/pull", get(routes::sync::pull))
        .route("/api/sync/status", get(routes::sync::status))
        .route("/api/sync/:collection", get(routes::sync::list_collection))
        .route("/api/sync/:collection/:id", get(routes::sync::get_document));

    let applier_routes = Router::new()
        .route("/api/applier/apply", post(routes::applier::apply))
        .route("/api/applier/batch", post(routes::applier::batch))
        .route("/api/applier/document/:collection/:id", get(routes::applier::get_document))
        .route("/api/applier/info/:collection", get(routes::applier::collection_info));

    let arbiter_routes = Router::new()
        .route("/api/arbiter/check", post(routes::arbiter::check))
        .route("/api/arbiter/resolve", post(routes::arbiter::resolve))
        .route("/api/arbiter/resolve/merge", post(routes::arbiter::resolve_merge))
        .route("/api/arbiter/resolve/fields", post(routes::arbiter::resolve_fields))
        .route("/api/arbiter/resolve/crdt", post(routes::arbiter::resolve_crdt));

    let upload_routes = Router::new()
        .route("/api/tus", post(routes::upload::create).get(routes::upload::list))
        .route(
            "/api/tus/:id",
            get(routes::upload::status).head(routes::upload::head).patch(routes::upload::patch).delete(routes::upload::delete),
        );

    let stream_routes = Router::new().route("/api/stream", get(routes::stream::upgrade));

    sync_routes
        .merge(applier_routes)
        .merge(arbiter_routes)
        .merge(upload_routes)
        .merge(stream_routes)
        .layer(cors_layer(config))
        .with_state(state)
}
