//! Server-side fan-out: a ring buffer of the last 1000 changes for late
//! joiners, and a connected-subscriber set where one slow/gone receiver
//! never blocks or drops messages for the others.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::ChangeEvent;

const RING_BUFFER_CAPACITY: usize = 1000;
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// A per-connection handle a websocket task reads from.
pub type SubscriberReceiver = mpsc::Receiver<ChangeEvent>;

struct Inner {
    ring: VecDeque<ChangeEvent>,
    subscribers: HashMap<u64, mpsc::Sender<ChangeEvent>>,
}

/// Tracks connected subscribers and recent history; broadcasting a change
/// to one subscriber never affects delivery to the others.
pub struct Broadcaster {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(RING_BUFFER_CAPACITY),
                subscribers: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving
    /// half of its channel.
    pub fn subscribe(&self) -> (u64, SubscriberReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.inner.lock().subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Replays buffered history to a late joiner, newest last.
    pub fn history(&self) -> Vec<ChangeEvent> {
        self.inner.lock().ring.iter().cloned().collect()
    }

    /// Records the change and fans it out. A subscriber whose channel is
    /// full or closed is dropped from the set rather than stalling the
    /// broadcast for everyone else.
    pub fn broadcast(&self, event: ChangeEvent) {
        let mut inner = self.inner.lock();
        if inner.ring.len() == RING_BUFFER_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event.clone());

        let mut dead = Vec::new();
        for (id, tx) in inner.subscribers.iter() {
            if let Err(err) = tx.try_send(event.clone()) {
                tracing::warn!(subscriber = id, error = %err, "dropping unresponsive realtime subscriber");
                dead.push(*id);
            }
        }
        for id in dead {
            inner.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(seq: i64) -> ChangeEvent {
        ChangeEvent {
            collection: "todos".to_string(),
            document_id: format!("t{seq}"),
            document: json!({"text": "hi"}),
            timestamp: 0,
            seq,
        }
    }

    #[tokio::test]
    async fn a_subscriber_receives_broadcast_changes() {
        let broadcaster = Broadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();

        broadcaster.broadcast(event(1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 1);
    }

    #[test]
    fn ring_buffer_caps_at_1000_and_drops_oldest() {
        let broadcaster = Broadcaster::new();
        for seq in 0..1200 {
            broadcaster.broadcast(event(seq));
        }
        let history = broadcaster.history();
        assert_eq!(history.len(), RING_BUFFER_CAPACITY);
        assert_eq!(history.first().unwrap().seq, 200);
        assert_eq!(history.last().unwrap().seq, 1199);
    }

    #[tokio::test]
    async fn a_full_subscriber_channel_is_dropped_without_affecting_others() {
        let broadcaster = Broadcaster::new();
        let (_slow_id, _slow_rx) = broadcaster.subscribe(); // never drained
        let (_fast_id, mut fast_rx) = broadcaster.subscribe();

        for seq in 0..(SUBSCRIBER_CHANNEL_CAPACITY as i64 + 10) {
            broadcaster.broadcast(event(seq));
        }

        // the fast subscriber is drained concurrently with broadcasting in
        // real usage; here we just confirm it still received the first item
        // and the broadcaster didn't panic or block on the slow one.
        let first = fast_rx.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert!(broadcaster.subscriber_count() <= 2);
    }

    #[test]
    fn unsubscribe_removes_from_the_set() {
        let broadcaster = Broadcaster::new();
        let (id, _rx) = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);
        broadcaster.unsubscribe(id);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
