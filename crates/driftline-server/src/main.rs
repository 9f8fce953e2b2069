use std::sync::Arc;

use driftline_server::{build_router, AppState, ServerConfig};
use driftline_store::{MemoryStore, StoreBackend};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    let store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
    let state = AppState::new(store, config.upload_dir.clone());
    let router = build_router(state, &config);

    let addr = std::net::SocketAddr::from((config.host, config.port));
    tracing::info!(%addr, "driftline-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    axum::serve(listener, router).await.expect("server error");
}
