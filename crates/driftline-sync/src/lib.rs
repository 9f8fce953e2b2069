//! The push/pull sync engine: batching, compression (via `driftline-codec`),
//! causality tracking (via `driftline-vclock`), and resumption through a
//! persisted `sync_metadata` cursor.
//!
//! At most one sync attempt is ever in flight per [`SyncEngine`]; concurrent
//! `sync()` callers share the same outstanding result.

mod engine;
mod error;
mod metadata;
mod transport;
mod types;

pub use engine::{SyncEngine, SyncOutcome};
pub use error::{Result, SyncError};
pub use transport::{HttpTransport, SyncTransport};
pub use types::{
    ConflictStrategy, Phase, PullItem, PullResponse, PushAction, PushFailure, PushRequest,
    PushResponse, SyncConfig, SyncMetadata, SyncState,
};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use driftline_netmon::NetworkMonitor;
    use driftline_outbox::{ActionKind, Outbox};
    use driftline_store::{Document, MemoryStore, StoreBackend};
    use driftline_vclock::VectorClock;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;

    /// An in-process mock transport backed directly by a server-side store
    /// + applier, so push/pull tests exercise the full protocol shape
    /// without any real network I/O.
    struct LoopbackTransport {
        server_store: Arc<dyn StoreBackend>,
        server_applier: driftline_applier::Applier,
        server_vector_clock: Mutex<VectorClock>,
        fail_push: AtomicUsize,
    }

    impl LoopbackTransport {
        fn new(server_store: Arc<dyn StoreBackend>) -> Self {
            Self {
                server_applier: driftline_applier::Applier::new(server_store.clone()),
                server_store,
                server_vector_clock: Mutex::new(VectorClock::new()),
                fail_push: AtomicUsize::new(0),
            }
        }

        fn fail_next_push(&self, times: usize) {
            self.fail_push.store(times, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SyncTransport for LoopbackTransport {
        async fn push(&self, _url: &str, request: &PushRequest) -> Result<PushResponse> {
            if self.fail_push.load(Ordering::SeqCst) > 0 {
                self.fail_push.fetch_sub(1, Ordering::SeqCst);
                return Err(SyncError::Network("simulated transport failure".to_string()));
            }

            self.server_vector_clock.lock().await.merge(&request.vector_clock, "server");

            let mutations: Vec<driftline_applier::Mutation> = request
                .actions
                .iter()
                .map(|a| driftline_applier::Mutation {
                    id: a.id.clone(),
                    kind: a.kind,
                    collection: a.collection.clone(),
                    document_id: a.document_id.clone(),
                    data: a.data.clone(),
                    timestamp: a.timestamp,
                })
                .collect();

            let result = self.server_applier.apply_batch(&mutations);
            Ok(PushResponse {
                succeeded: result.succeeded,
                failed: result
                    .failed
                    .into_iter()
                    .map(|f| PushFailure { action_id: f.action_id, error: f.error })
                    .collect(),
            })
        }

        async fn pull(
            &self,
            _url: &str,
            since: i64,
            _vector_clock: &VectorClock,
            _client_id: &str,
            limit: usize,
        ) -> Result<PullResponse> {
            let mut items = Vec::new();
            for collection in ["todos", "products"] {
                for change in self.server_store.changes(collection, since, limit)? {
                    items.push(PullItem {
                        collection: collection.to_string(),
                        document: serde_json::to_value(&change.doc)?,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                        seq: change.seq,
                    });
                }
            }
            let server_clock = self.server_vector_clock.lock().await.clone();
            Ok(PullResponse {
                since,
                has_more: false,
                items,
                server_vector_clock: Some(server_clock),
            })
        }
    }

    fn make_engine(replica_id: &str, server_store: Arc<dyn StoreBackend>) -> (Arc<SyncEngine>, Arc<dyn StoreBackend>, Arc<Outbox>, Arc<LoopbackTransport>) {
        let client_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let outbox = Arc::new(Outbox::new(client_store.clone()));
        let netmon = NetworkMonitor::new(driftline_netmon::NetworkMonitorConfig::default());
        let transport = Arc::new(LoopbackTransport::new(server_store));
        let config = SyncConfig {
            replica_id: replica_id.to_string(),
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(config, client_store.clone(), outbox.clone(), netmon, transport.clone());
        (engine, client_store, outbox, transport)
    }

    #[tokio::test]
    async fn offline_create_then_sync_lands_on_server_and_advances_cursor() {
        let server_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let (engine, _client_store, outbox, _transport) = make_engine("c1", server_store.clone());

        outbox.enqueue(ActionKind::Create, "todos", "t1", json!({"text": "Buy milk", "completed": false})).unwrap();

        let outcome = engine.sync().await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.pushed, 1);

        let pending = outbox.get_pending(None).unwrap();
        assert!(pending.is_empty());
        let done = outbox.get_by_status(driftline_outbox::ActionStatus::Done).unwrap();
        assert_eq!(done.len(), 1);

        let server_doc = server_store.get("todos", "t1").unwrap().unwrap();
        assert_eq!(server_doc.data["text"], json!("Buy milk"));

        let state = engine.state();
        assert!(state.borrow().last_sync_at.unwrap() > 0);
        assert!(state.borrow().vector_clock.get("c1") >= 0); // cursor updated via metadata, not engine state directly
    }

    #[tokio::test]
    async fn transport_failure_marks_actions_failed_for_retry() {
        let server_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let (engine, _client_store, outbox, transport) = make_engine("c1", server_store);
        transport.fail_next_push(1);

        outbox.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        let outcome = engine.sync().await;
        assert!(outcome.error.is_some());

        let failed = outbox.get_by_status(driftline_outbox::ActionStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 1);
    }

    #[tokio::test]
    async fn pull_upserts_documents_created_on_the_server() {
        let server_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        server_store.insert("todos", Some("remote-1"), json!({"text": "from server"})).unwrap();

        let (engine, client_store, _outbox, _transport) = make_engine("c1", server_store);
        let outcome = engine.sync().await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.pulled, 1);

        let local = client_store.get("todos", "remote-1").unwrap().unwrap();
        assert_eq!(local.data["text"], json!("from server"));
    }

    #[tokio::test]
    async fn concurrent_sync_calls_share_the_same_outcome() {
        let server_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let (engine, _client_store, outbox, _transport) = make_engine("c1", server_store);
        outbox.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();

        let e1 = engine.clone();
        let e2 = engine.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { e1.sync().await }),
            tokio::spawn(async move { e2.sync().await })
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.pushed, b.pushed);
    }

    #[tokio::test]
    async fn recover_reverts_crashed_syncing_actions_to_pending() {
        let server_store: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let (engine, _client_store, outbox, _transport) = make_engine("c1", server_store);
        let action = outbox.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        outbox.mark_syncing(&action.id).unwrap();

        let recovered = engine.recover().unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(outbox.get(&action.id).unwrap().status, driftline_outbox::ActionStatus::Pending);
    }

    #[test]
    fn document_with_fake_data() {
        // sanity: Document round-trips through serde the way PullItem expects.
        let doc = Document {
            id: "t1".to_string(),
            collection: "todos".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            deleted: false,
            rev: "1-abc".to_string(),
            data: json!({"text": "hi"}),
        };
        let value = serde_json::to_value(&doc).unwrap();
        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(doc, back);
    }
}
