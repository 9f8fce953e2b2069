//! `/api/stream` — the real-time WebSocket endpoint. A connection can
//! narrow itself to a set of collections with a `subscribe` frame; an empty
//! or absent subscription means "everything".

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use driftline_realtime::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;

use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (subscriber_id, mut rx) = state.broadcaster.subscribe();
    let collections: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let connected = serde_json::to_string(&ServerMessage::Connected).unwrap_or_default();
    if sender.send(Message::Text(connected)).await.is_err() {
        state.broadcaster.unsubscribe(subscriber_id);
        return;
    }

    for event in state.broadcaster.history() {
        let frame = ServerMessage::Change { data: event };
        if let Ok(text) = serde_json::to_string(&frame) {
            if sender.send(Message::Text(text)).await.is_err() {
                state.broadcaster.unsubscribe(subscriber_id);
                return;
            }
        }
    }

    let forward_task = {
        let collections = collections.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                {
                    let wanted = collections.lock();
                    if !wanted.is_empty() && !wanted.contains(&event.collection) {
                        continue;
                    }
                }
                let frame = ServerMessage::Change { data: event };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        })
    };

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { collections: requested }) => {
                    *collections.lock() = requested;
                    tracing::debug!(subscriber = subscriber_id, "realtime subscription updated");
                }
                Err(err) => {
                    tracing::debug!(subscriber = subscriber_id, error = %err, "ignoring malformed realtime frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(subscriber = subscriber_id, error = %err, "realtime socket error");
                break;
            }
        }
    }

    forward_task.abort();
    state.broadcaster.unsubscribe(subscriber_id);
    tracing::debug!(subscriber = subscriber_id, "realtime subscriber disconnected");
}
