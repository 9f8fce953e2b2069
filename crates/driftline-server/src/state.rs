use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use driftline_applier::Applier;
use driftline_arbiter::Arbiter;
use driftline_realtime::Broadcaster;
use driftline_store::StoreBackend;
use driftline_upload::UploadManager;

/// Shared, owned-by-the-server state passed to every route handler — no
/// process-wide singletons for the broadcaster or the CRDT cache, per
/// Design Notes.
pub struct AppState {
    pub store: Arc<dyn StoreBackend>,
    pub applier: Applier,
    pub arbiter: Arbiter,
    pub broadcaster: Arc<Broadcaster>,
    pub uploads: Arc<UploadManager>,
    pub started_at: i64,
    total_mutations: AtomicI64,
    last_update: AtomicI64,
}

impl AppState {
    pub fn new(store: Arc<dyn StoreBackend>, upload_dir: impl Into<std::path::PathBuf>) -> Arc<Self> {
        let applier = Applier::new(store.clone());
        let arbiter = Arbiter::new(store.clone());
        let now = chrono::Utc::now().timestamp_millis();
        Arc::new(Self {
            store,
            applier,
            arbiter,
            broadcaster: Arc::new(Broadcaster::new()),
            uploads: Arc::new(UploadManager::new(upload_dir)),
            started_at: now,
            total_mutations: AtomicI64::new(0),
            last_update: AtomicI64::new(now),
        })
    }

    /// Records one applied mutation for `/api/sync/status` reporting.
    pub fn record_mutation(&self) {
        self.total_mutations.fetch_add(1, Ordering::Relaxed);
        self.last_update.store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn total_mutations(&self) -> i64 {
        self.total_mutations.load(Ordering::Relaxed)
    }

    pub fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::Relaxed)
    }

    pub fn connected_clients(&self) -> usize {
        self.broadcaster.subscriber_count()
    }
}
