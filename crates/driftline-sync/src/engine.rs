//! The sync engine: periodic + event-triggered push/pull with an explicit
//! `Idle -> Draining -> Pushing -> Pulling -> Cleaning -> Idle` state
//! machine, so suspension points and crash-recovery invariants are visible
//! rather than buried in ad hoc async control flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use driftline_applier::{Applier, Mutation, MutationKind};
use driftline_netmon::NetworkMonitor;
use driftline_outbox::{Action, ActionKind, ActionStatus, Outbox};
use driftline_store::StoreBackend;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::metadata;
use crate::transport::SyncTransport;
use crate::types::{Phase, PushAction, PushRequest, SyncConfig, SyncMetadata, SyncState};

type SharedOutcome = Shared<BoxFuture<'static, Arc<SyncOutcome>>>;

#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub pushed: usize,
    pub pulled: usize,
    pub error: Option<String>,
}

pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn StoreBackend>,
    outbox: Arc<Outbox>,
    netmon: Arc<NetworkMonitor>,
    applier: Applier,
    transport: Arc<dyn SyncTransport>,
    state_tx: watch::Sender<SyncState>,
    inflight: AsyncMutex<Option<SharedOutcome>>,
    destroyed: AtomicBool,
    timer_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn StoreBackend>,
        outbox: Arc<Outbox>,
        netmon: Arc<NetworkMonitor>,
        transport: Arc<dyn SyncTransport>,
    ) -> Arc<Self> {
        let applier = Applier::new(store.clone());
        let (state_tx, _) = watch::channel(SyncState::default());
        Arc::new(Self {
            config,
            store,
            outbox,
            netmon,
            applier,
            transport,
            state_tx,
            inflight: AsyncMutex::new(None),
            destroyed: AtomicBool::new(false),
            timer_task: std::sync::Mutex::new(None),
        })
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    fn update_state<F: FnOnce(&mut SyncState)>(&self, f: F) {
        self.state_tx.send_modify(f);
    }

    /// Reverts any action stuck in `Syncing` back to `Pending`. Call once
    /// on process start to recover from a crash mid-attempt.
    pub fn recover(&self) -> Result<usize> {
        Ok(self.outbox.recover()?)
    }

    /// Starts the periodic timer and the offline->online trigger. Returns a
    /// handle that is joined by [`Self::destroy`].
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = this.config.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut status = this.netmon.status();
            let mut was_online = *status.borrow();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if this.destroyed.load(Ordering::Acquire) {
                            break;
                        }
                        if this.netmon.is_online() && !this.state_tx.borrow().is_syncing {
                            let _ = this.sync().await;
                        }
                    }
                    changed = status.changed() => {
                        if changed.is_err() || this.destroyed.load(Ordering::Acquire) {
                            break;
                        }
                        let online = *status.borrow();
                        if online && !was_online {
                            let _ = this.sync().await;
                        }
                        was_online = online;
                    }
                }
            }
        });
        *self.timer_task.lock().unwrap() = Some(handle);
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        if let Some(handle) = self.timer_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Runs one sync attempt, or returns the result of an attempt already
    /// in flight. Concurrent callers all observe the same outcome.
    pub async fn sync(self: &Arc<Self>) -> Arc<SyncOutcome> {
        let mut guard = self.inflight.lock().await;
        if let Some(existing) = guard.as_ref() {
            let existing = existing.clone();
            drop(guard);
            return existing.await;
        }

        let this = Arc::clone(self);
        let fut: BoxFuture<'static, Arc<SyncOutcome>> = async move { Arc::new(this.run_attempt().await) }.boxed();
        let shared = fut.shared();
        *guard = Some(shared.clone());
        drop(guard);

        let result = shared.await;
        *self.inflight.lock().await = None;
        result
    }

    async fn run_attempt(&self) -> SyncOutcome {
        self.update_state(|s| {
            s.phase = Phase::Draining;
            s.is_syncing = true;
            s.error = None;
        });

        let mut outcome = SyncOutcome::default();

        if let Err(err) = self.requeue_retryable() {
            self.fail(&mut outcome, err);
            return self.finish(outcome);
        }

        self.update_state(|s| s.phase = Phase::Pushing);
        match self.push_phase().await {
            Ok(pushed) => outcome.pushed = pushed,
            Err(err) => {
                self.fail(&mut outcome, err);
                return self.finish(outcome);
            }
        }

        self.update_state(|s| s.phase = Phase::Pulling);
        match self.pull_phase().await {
            Ok(pulled) => outcome.pulled = pulled,
            Err(err) => {
                self.fail(&mut outcome, err);
                return self.finish(outcome);
            }
        }

        self.update_state(|s| s.phase = Phase::Cleaning);
        if let Err(err) = self.outbox.cleanup(None) {
            tracing::warn!(error = %err, "sync: cleanup failed, continuing");
        }

        self.finish(outcome)
    }

    fn fail(&self, outcome: &mut SyncOutcome, err: SyncError) {
        tracing::warn!(error = %err, "sync attempt failed");
        outcome.error = Some(err.to_string());
        self.update_state(|s| s.error = Some(err.to_string()));
    }

    fn finish(&self, outcome: SyncOutcome) -> SyncOutcome {
        let pending_count = self.outbox.get_pending(None).map(|v| v.len()).unwrap_or(0);
        let now = chrono::Utc::now().timestamp_millis();
        self.update_state(|s| {
            s.phase = Phase::Idle;
            s.is_syncing = false;
            s.pending_count = pending_count;
            s.last_sync_at = Some(now);
        });
        outcome
    }

    fn requeue_retryable(&self) -> Result<()> {
        for action in self.outbox.get_retryable()? {
            self.outbox.update_status(&action.id, ActionStatus::Pending, None)?;
        }
        Ok(())
    }

    async fn push_phase(&self) -> Result<usize> {
        let pending = self.outbox.get_pending(Some(self.config.batch_size))?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut metadata = metadata::load(&self.store)?;
        metadata.vector_clock.increment(&self.config.replica_id);

        let mut syncing = Vec::with_capacity(pending.len());
        for action in &pending {
            self.outbox.mark_syncing(&action.id)?;
            syncing.push(action.clone());
        }

        let request = PushRequest {
            actions: syncing.iter().map(to_push_action).collect(),
            vector_clock: metadata.vector_clock.clone(),
            client_id: self.config.replica_id.clone(),
        };

        match self.transport.push(&self.config.url, &request).await {
            Ok(response) => {
                for id in &response.succeeded {
                    self.outbox.mark_done(id)?;
                }
                for failure in &response.failed {
                    self.outbox.mark_failed(&failure.action_id, failure.error.clone())?;
                }
                // Transport delivered a response, but the server may not
                // have acknowledged every action we sent: anything neither
                // listed as succeeded nor failed is treated as failed so it
                // retries rather than silently stalling in `Syncing`.
                for action in &syncing {
                    let acked = response.succeeded.contains(&action.id)
                        || response.failed.iter().any(|f| f.action_id == action.id);
                    if !acked {
                        self.outbox.mark_failed(&action.id, "no server acknowledgement".to_string())?;
                    }
                }
                Ok(syncing.len())
            }
            Err(err) => {
                for action in &syncing {
                    self.outbox.mark_failed(&action.id, err.to_string())?;
                }
                Err(err)
            }
        }
    }

    async fn pull_phase(&self) -> Result<usize> {
        let mut metadata = metadata::load(&self.store)?;

        let response = self
            .transport
            .pull(
                &self.config.url,
                metadata.last_sync_at,
                &metadata.vector_clock,
                &self.config.replica_id,
                self.config.batch_size,
            )
            .await?;

        if let Some(server_clock) = &response.server_vector_clock {
            metadata.vector_clock.merge(server_clock, &self.config.replica_id);
        }

        for item in &response.items {
            if let Err(err) = self.apply_pulled_item(item) {
                tracing::warn!(error = %err, "sync: failed to apply pulled item, continuing");
            }
        }

        metadata.last_sync_at = chrono::Utc::now().timestamp_millis();
        metadata::save(&self.store, &metadata)?;

        Ok(response.items.len())
    }

    fn apply_pulled_item(&self, item: &crate::types::PullItem) -> Result<()> {
        let doc: driftline_store::Document = serde_json::from_value(item.document.clone())?;
        let existing = self.store.get(&item.collection, &doc.id)?;

        let kind = if doc.deleted {
            MutationKind::Delete
        } else if existing.is_some() {
            MutationKind::Update
        } else {
            MutationKind::Create
        };

        let mutation = Mutation {
            id: format!("pull-{}", item.seq),
            kind,
            collection: item.collection.clone(),
            document_id: doc.id.clone(),
            data: doc.data.clone(),
            timestamp: item.timestamp,
        };

        match self.applier.apply_one(&mutation) {
            Ok(_) => Ok(()),
            // A delete of a document we never saw (or already tombstoned)
            // is a no-op from the receiver's point of view.
            Err(driftline_applier::ApplierError::DocumentNotFound { .. }) if kind == MutationKind::Delete => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn to_push_action(action: &Action) -> PushAction {
    PushAction {
        id: action.id.clone(),
        kind: match action.kind {
            ActionKind::Create => MutationKind::Create,
            ActionKind::Update => MutationKind::Update,
            ActionKind::Delete => MutationKind::Delete,
        },
        collection: action.collection.clone(),
        document_id: action.document_id.clone(),
        data: action.data.clone(),
        timestamp: action.timestamp,
    }
}
