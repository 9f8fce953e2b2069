use std::sync::Arc;

use driftline_store::{Document, Selector, StoreBackend};
use tokio::sync::watch;

use crate::error::{OutboxError, Result};
use crate::types::{Action, ActionKind, ActionStatus, RetryPolicy};

const COLLECTION: &str = "outbox_actions";

fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<()> {
    use ActionStatus::*;
    let ok = matches!(
        (from, to),
        (Pending, Syncing) | (Syncing, Done) | (Syncing, Failed) | (Failed, Pending) | (Syncing, Pending)
    );
    if ok {
        Ok(())
    } else {
        Err(OutboxError::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        })
    }
}

/// Durable, ordered queue of pending mutations, backed by the store's
/// `outbox_actions` collection. Single-writer within the process.
pub struct Outbox {
    store: Arc<dyn StoreBackend>,
    policy: RetryPolicy,
    notify: watch::Sender<Vec<Action>>,
}

impl Outbox {
    pub fn new(store: Arc<dyn StoreBackend>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn StoreBackend>, policy: RetryPolicy) -> Self {
        let (notify, _) = watch::channel(Vec::new());
        Self { store, policy, notify }
    }

    fn decode(doc: &Document) -> Result<Action> {
        Ok(serde_json::from_value(doc.data.clone())?)
    }

    fn load_all(&self) -> Result<Vec<Action>> {
        self.store
            .find(COLLECTION, &Selector::new(), None)?
            .iter()
            .filter(|doc| !doc.deleted)
            .map(Self::decode)
            .collect()
    }

    fn load_by_status(&self, status: ActionStatus) -> Result<Vec<Action>> {
        let selector = Selector::new().eq("status", serde_json::to_value(status)?);
        self.store
            .find(COLLECTION, &selector, None)?
            .iter()
            .filter(|doc| !doc.deleted)
            .map(Self::decode)
            .collect()
    }

    fn publish_snapshot(&self) -> Result<()> {
        let mut all = self.load_all()?;
        all.sort_by_key(|a| a.timestamp);
        let _ = self.notify.send(all);
        Ok(())
    }

    /// A restartable, lazy view of the current queue snapshot; updates
    /// whenever the queue changes.
    pub fn observe(&self) -> watch::Receiver<Vec<Action>> {
        self.notify.subscribe()
    }

    pub fn enqueue(&self, kind: ActionKind, collection: &str, document_id: &str, data: serde_json::Value) -> Result<Action> {
        let action = Action {
            id: Action::new_id(),
            kind,
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status: ActionStatus::Pending,
            retry_count: 0,
            error: None,
        };
        self.store.insert(COLLECTION, Some(&action.id), serde_json::to_value(&action)?)?;
        self.publish_snapshot()?;
        tracing::debug!(action_id = %action.id, collection, document_id, "enqueued outbox action");
        Ok(action)
    }

    pub fn get(&self, id: &str) -> Result<Action> {
        let doc = self
            .store
            .get(COLLECTION, id)?
            .filter(|d| !d.deleted)
            .ok_or_else(|| OutboxError::ActionNotFound(id.to_string()))?;
        Self::decode(&doc)
    }

    pub fn get_pending(&self, limit: Option<usize>) -> Result<Vec<Action>> {
        let mut pending = self.load_by_status(ActionStatus::Pending)?;
        pending.sort_by_key(|a| a.timestamp);
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    pub fn get_by_status(&self, status: ActionStatus) -> Result<Vec<Action>> {
        let mut actions = self.load_by_status(status)?;
        actions.sort_by_key(|a| a.timestamp);
        Ok(actions)
    }

    pub fn get_retryable(&self) -> Result<Vec<Action>> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut retryable: Vec<Action> = self
            .load_by_status(ActionStatus::Failed)?
            .into_iter()
            .filter(|a| a.retry_count < self.policy.max_retries)
            .filter(|a| now >= a.timestamp + self.policy.calculate_delay(a.retry_count))
            .collect();
        retryable.sort_by_key(|a| a.timestamp);
        Ok(retryable)
    }

    pub fn update_status(&self, id: &str, new_status: ActionStatus, error: Option<String>) -> Result<Action> {
        let mut action = self.get(id)?;
        validate_transition(action.status, new_status)?;
        action.status = new_status;
        action.error = error;
        if new_status == ActionStatus::Failed {
            action.retry_count += 1;
        }
        self.store.patch(COLLECTION, id, serde_json::to_value(&action)?)?;
        self.publish_snapshot()?;
        Ok(action)
    }

    pub fn mark_syncing(&self, id: &str) -> Result<Action> {
        self.update_status(id, ActionStatus::Syncing, None)
    }

    pub fn mark_done(&self, id: &str) -> Result<Action> {
        self.update_status(id, ActionStatus::Done, None)
    }

    pub fn mark_failed(&self, id: &str, error: String) -> Result<Action> {
        self.update_status(id, ActionStatus::Failed, Some(error))
    }

    pub fn calculate_retry_delay(&self, retry_count: u32) -> i64 {
        self.policy.calculate_delay(retry_count)
    }

    /// Reverts any action left in `Syncing` back to `Pending`. Call once on
    /// process start to recover from a crash mid-sync-attempt.
    pub fn recover(&self) -> Result<usize> {
        let stuck = self.load_by_status(ActionStatus::Syncing)?;
        let count = stuck.len();
        for action in stuck {
            self.update_status(&action.id, ActionStatus::Pending, None)?;
        }
        Ok(count)
    }

    /// Removes `Done` actions older than `older_than_ms` (default 24h).
    pub fn cleanup(&self, older_than_ms: Option<i64>) -> Result<usize> {
        let cutoff_ms = older_than_ms.unwrap_or(24 * 60 * 60 * 1000);
        let now = chrono::Utc::now();
        let selector = Selector::new().eq("status", serde_json::to_value(ActionStatus::Done)?);
        let docs = self.store.find(COLLECTION, &selector, None)?;

        let mut removed = 0;
        for doc in docs.iter().filter(|d| !d.deleted) {
            let updated_at = chrono::DateTime::parse_from_rfc3339(&doc.updated_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or(now);
            let age_ms = (now - updated_at).num_milliseconds();
            if age_ms >= cutoff_ms {
                self.store.soft_delete(COLLECTION, &doc.id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            self.publish_snapshot()?;
        }
        Ok(removed)
    }

    /// Drops all actions. Operator use only.
    pub fn clear(&self) -> Result<()> {
        for doc in self.store.find(COLLECTION, &Selector::new(), None)?.iter().filter(|d| !d.deleted) {
            self.store.soft_delete(COLLECTION, &doc.id)?;
        }
        self.publish_snapshot()?;
        Ok(())
    }
}
