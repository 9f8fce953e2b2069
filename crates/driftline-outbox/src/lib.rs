mod error;
mod outbox;
mod types;

pub use error::{OutboxError, Result};
pub use outbox::Outbox;
pub use types::{Action, ActionKind, ActionStatus, RetryPolicy};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use driftline_store::MemoryStore;
    use serde_json::json;

    use super::*;

    fn outbox() -> Outbox {
        Outbox::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn enqueue_then_drain_in_timestamp_order() {
        let ob = outbox();
        ob.enqueue(ActionKind::Create, "todos", "t1", json!({"text": "a"})).unwrap();
        ob.enqueue(ActionKind::Create, "todos", "t2", json!({"text": "b"})).unwrap();

        let pending = ob.get_pending(None).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].timestamp <= pending[1].timestamp);
    }

    #[test]
    fn full_lifecycle_pending_to_done() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Update, "todos", "t1", json!({})).unwrap();

        ob.mark_syncing(&action.id).unwrap();
        let synced = ob.get(&action.id).unwrap();
        assert_eq!(synced.status, ActionStatus::Syncing);

        ob.mark_done(&action.id).unwrap();
        let done = ob.get(&action.id).unwrap();
        assert_eq!(done.status, ActionStatus::Done);
        assert!(ob.get_pending(None).unwrap().is_empty());
    }

    #[test]
    fn failed_action_increments_retry_count_each_time() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.mark_syncing(&action.id).unwrap();
        ob.mark_failed(&action.id, "transport error".to_string()).unwrap();

        let failed = ob.get(&action.id).unwrap();
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error.as_deref(), Some("transport error"));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        let err = ob.update_status(&action.id, ActionStatus::Done, None).unwrap_err();
        assert!(matches!(err, OutboxError::InvalidTransition { .. }));
    }

    #[test]
    fn retry_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(0), 1000);
        assert_eq!(policy.calculate_delay(1), 2000);
        assert_eq!(policy.calculate_delay(2), 4000);
        assert_eq!(policy.calculate_delay(10), 60_000);
    }

    #[test]
    fn retryable_excludes_actions_still_within_backoff_window() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.mark_syncing(&action.id).unwrap();
        ob.mark_failed(&action.id, "boom".to_string()).unwrap();

        // initial backoff is 1000ms; immediately after failing the action
        // should not be retryable yet.
        assert!(ob.get_retryable().unwrap().is_empty());
    }

    #[test]
    fn retryable_excludes_actions_past_max_retries() {
        let ob = outbox();
        let action = ob
            .enqueue(ActionKind::Create, "todos", "t1", json!({}))
            .unwrap();
        ob.mark_syncing(&action.id).unwrap();
        for _ in 0..RetryPolicy::default().max_retries {
            ob.mark_failed(&action.id, "boom".to_string()).unwrap();
            if ob.get(&action.id).unwrap().retry_count < RetryPolicy::default().max_retries {
                ob.update_status(&action.id, ActionStatus::Pending, None).unwrap();
                ob.mark_syncing(&action.id).unwrap();
            }
        }
        let failed = ob.get(&action.id).unwrap();
        assert_eq!(failed.retry_count, RetryPolicy::default().max_retries);
        assert!(ob.get_retryable().unwrap().is_empty());
    }

    #[test]
    fn crash_recovery_reverts_syncing_to_pending() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.mark_syncing(&action.id).unwrap();

        let recovered = ob.recover().unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(ob.get(&action.id).unwrap().status, ActionStatus::Pending);
    }

    #[test]
    fn cleanup_removes_only_done_actions_past_cutoff() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.mark_syncing(&action.id).unwrap();
        ob.mark_done(&action.id).unwrap();

        // cutoff of 0ms means "anything already done" is eligible.
        let removed = ob.cleanup(Some(0)).unwrap();
        assert_eq!(removed, 1);
        assert!(ob.get(&action.id).is_err());
    }

    #[test]
    fn cleanup_leaves_recent_done_actions_alone() {
        let ob = outbox();
        let action = ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.mark_syncing(&action.id).unwrap();
        ob.mark_done(&action.id).unwrap();

        let removed = ob.cleanup(Some(24 * 60 * 60 * 1000)).unwrap();
        assert_eq!(removed, 0);
        assert!(ob.get(&action.id).is_ok());
    }

    #[test]
    fn observe_emits_a_snapshot_per_mutation() {
        let ob = outbox();
        let mut rx = ob.observe();
        assert!(rx.borrow().is_empty());

        ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[test]
    fn clear_drops_all_actions() {
        let ob = outbox();
        ob.enqueue(ActionKind::Create, "todos", "t1", json!({})).unwrap();
        ob.enqueue(ActionKind::Create, "todos", "t2", json!({})).unwrap();
        ob.clear().unwrap();
        assert!(ob.get_pending(None).unwrap().is_empty());
    }
}
