//! Client-side long-lived subscriber: connects to `/api/stream`, applies
//! each incoming change through the same path a bulk pull would use, and
//! reconnects with exponential backoff on anything other than a
//! caller-initiated [`RealtimeClient::destroy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use driftline_applier::{Applier, Mutation, MutationKind};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{RealtimeError, Result};
use crate::types::{ChangeEvent, ClientMessage, ServerMessage};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runtime configuration for a client subscription.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: String,
    pub collections: Vec<String>,
}

/// Observable connection state, surfaced so UIs can show an online/offline
/// indicator independent of [`driftline_netmon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

pub struct RealtimeClient {
    config: RealtimeConfig,
    applier: Applier,
    state_tx: watch::Sender<ConnectionState>,
    manual_close: Arc<AtomicBool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, applier: Applier) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            config,
            applier,
            state_tx,
            manual_close: Arc::new(AtomicBool::new(false)),
            task: std::sync::Mutex::new(None),
        })
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Starts the connect/reconnect loop in the background.
    pub fn connect(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Manual close: the reconnect loop exits instead of retrying.
    pub fn destroy(&self) {
        self.manual_close.store(true, Ordering::Release);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
    }

    async fn run(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if self.manual_close.load(Ordering::Acquire) {
                return;
            }

            let _ = self.state_tx.send(ConnectionState::Connecting);
            match self.run_connection().await {
                Ok(()) => {
                    // `run_connection` only returns Ok on a clean server-initiated close.
                    backoff = INITIAL_BACKOFF;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "realtime connection lost, reconnecting");
                }
            }

            if self.manual_close.load(Ordering::Acquire) {
                return;
            }

            let _ = self.state_tx.send(ConnectionState::Disconnected);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run_connection(&self) -> Result<()> {
        let (stream, _) = tokio_tungstenite::connect_async(&self.config.url)
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        let (mut tx, mut rx) = stream.split();

        let subscribe = ClientMessage::Subscribe { collections: self.config.collections.clone() };
        let payload = serde_json::to_string(&subscribe)?;
        tx.send(Message::Text(payload))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let _ = self.state_tx.send(ConnectionState::Connected);

        while let Some(message) = rx.next().await {
            let message = message.map_err(|e| RealtimeError::Transport(e.to_string()))?;
            match message {
                Message::Text(text) => {
                    self.handle_frame(&text)?;
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }
        Err(RealtimeError::Closed)
    }

    fn handle_frame(&self, text: &str) -> Result<()> {
        let parsed: ServerMessage = serde_json::from_str(text)?;
        match parsed {
            ServerMessage::Connected => {}
            ServerMessage::Error { error } => {
                tracing::warn!(error, "realtime server reported an error");
            }
            ServerMessage::Change { data } => {
                if let Err(err) = self.apply_change(&data) {
                    tracing::warn!(error = %err, "failed to apply realtime change");
                }
            }
        }
        Ok(())
    }

    /// Single-item upsert through the same conflict path a bulk pull uses:
    /// decode the full document, infer Create/Update/Delete from local
    /// existence and its tombstone flag, and tolerate deleting a document
    /// this replica never had.
    fn apply_change(&self, event: &ChangeEvent) -> Result<()> {
        let doc: driftline_store::Document = serde_json::from_value(event.document.clone())?;
        let existing = self.applier.get_document(&event.collection, &event.document_id)?;

        let kind = if doc.deleted {
            MutationKind::Delete
        } else if existing.is_some() {
            MutationKind::Update
        } else {
            MutationKind::Create
        };

        let mutation = Mutation {
            id: format!("realtime-{}", event.seq),
            kind,
            collection: event.collection.clone(),
            document_id: event.document_id.clone(),
            data: doc.data,
            timestamp: event.timestamp,
        };

        match self.applier.apply_one(&mutation) {
            Ok(_) => Ok(()),
            Err(driftline_applier::ApplierError::DocumentNotFound { .. }) if kind == MutationKind::Delete => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use driftline_store::MemoryStore;
    use serde_json::json;

    use super::*;

    fn client() -> Arc<RealtimeClient> {
        let store: Arc<dyn driftline_store::StoreBackend> = Arc::new(MemoryStore::new());
        let applier = Applier::new(store);
        RealtimeClient::new(
            RealtimeConfig { url: "ws://localhost:3000/api/stream".to_string(), collections: vec!["todos".to_string()] },
            applier,
        )
    }

    fn change_event(doc: serde_json::Value, seq: i64) -> ChangeEvent {
        ChangeEvent {
            collection: "todos".to_string(),
            document_id: doc["id"].as_str().unwrap().to_string(),
            document: doc,
            timestamp: 1,
            seq,
        }
    }

    #[test]
    fn a_change_for_an_unknown_document_creates_it() {
        let client = client();
        let doc = json!({
            "id": "t1", "collection": "todos", "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z", "deleted": false, "rev": "1-a",
            "data": {"text": "hi"},
        });
        client.apply_change(&change_event(doc, 1)).unwrap();

        let stored = client.applier.get_document("todos", "t1").unwrap().unwrap();
        assert_eq!(stored.data["text"], json!("hi"));
    }

    #[test]
    fn a_change_for_an_existing_document_updates_it() {
        let client = client();
        let create = json!({
            "id": "t1", "collection": "todos", "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z", "deleted": false, "rev": "1-a",
            "data": {"text": "hi", "completed": false},
        });
        client.apply_change(&change_event(create, 1)).unwrap();

        let update = json!({
            "id": "t1", "collection": "todos", "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:01:00Z", "deleted": false, "rev": "2-b",
            "data": {"completed": true},
        });
        client.apply_change(&change_event(update, 2)).unwrap();

        let stored = client.applier.get_document("todos", "t1").unwrap().unwrap();
        assert_eq!(stored.data["text"], json!("hi"));
        assert_eq!(stored.data["completed"], json!(true));
    }

    #[test]
    fn a_delete_of_an_unknown_document_is_a_silent_no_op() {
        let client = client();
        let doc = json!({
            "id": "ghost", "collection": "todos", "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z", "deleted": true, "rev": "1-a",
            "data": {},
        });
        client.apply_change(&change_event(doc, 1)).unwrap();
    }

    #[test]
    fn backoff_doubles_up_to_the_30_second_cap() {
        let mut backoff = INITIAL_BACKOFF;
        let mut steps = Vec::new();
        for _ in 0..8 {
            steps.push(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        assert_eq!(steps[0], Duration::from_secs(1));
        assert_eq!(steps[1], Duration::from_secs(2));
        assert_eq!(steps[5], Duration::from_secs(30));
        assert_eq!(steps[7], Duration::from_secs(30));
    }

    #[tokio::test]
    async fn destroy_sets_state_to_disconnected_and_stops_reconnecting() {
        let client = client();
        client.manual_close.store(false, Ordering::SeqCst);
        client.destroy();
        assert!(client.manual_close.load(Ordering::SeqCst));
        assert_eq!(*client.state().borrow(), ConnectionState::Disconnected);
    }
}
