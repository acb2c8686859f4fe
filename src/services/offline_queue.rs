//! Offline action queue.
//!
//! Durable, ordered store of mutating requests that could not be delivered.
//! A drain replays actions one at a time in `(enqueued_at, sequence)` order,
//! awaiting each outcome before starting the next. A retryable failure stops
//! the drain so that later actions never overtake an earlier one; an
//! abandoned action is deleted and announced on the failure channel.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{QueueError, QueueResult, RequestError};
use crate::domain::models::{
    ConnectionTier, OfflineQueueConfig, PermanentFailure, QueuedAction, ScheduledRequest,
};
use crate::domain::ports::{ActionSink, ActionStore};
use crate::services::request_scheduler::RequestScheduler;

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Actions replayed successfully and removed.
    pub delivered: usize,
    /// Actions abandoned after their last attempt.
    pub failed_permanently: usize,
    /// Actions still pending when the pass ended.
    pub remaining: usize,
    /// A retryable failure (or loss of connectivity) ended the pass.
    pub stopped_early: bool,
    /// Another drain was already running; nothing was done.
    pub already_running: bool,
    /// The link was offline; nothing was done.
    pub skipped_offline: bool,
}

impl DrainReport {
    /// Whether the pass actually looked at the queue.
    pub const fn did_work(&self) -> bool {
        !self.already_running && !self.skipped_offline
    }
}

/// Persistent FIFO of deferred mutations, replayed through the scheduler.
///
/// At most one drain runs at a time; concurrent callers get a report with
/// `already_running` set.
pub struct OfflineActionQueue {
    store: Arc<dyn ActionStore>,
    max_attempts: u32,
    capacity: usize,
    drain_lock: Mutex<()>,
    failures: broadcast::Sender<PermanentFailure>,
    pending: watch::Sender<usize>,
}

impl OfflineActionQueue {
    /// Open the queue over `store`, reading the initial pending count.
    pub async fn open(store: Arc<dyn ActionStore>, config: &OfflineQueueConfig) -> QueueResult<Self> {
        let initial = store.count().await?;
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let (pending, _) = watch::channel(initial);

        debug!(pending = initial, capacity = config.capacity, "offline queue opened");

        Ok(Self {
            store,
            max_attempts: config.max_attempts.max(1),
            capacity: config.capacity,
            drain_lock: Mutex::new(()),
            failures,
            pending,
        })
    }

    /// Persist a request for later replay.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn enqueue(&self, request: &ScheduledRequest) -> QueueResult<QueuedAction> {
        self.enqueue_action(QueuedAction::from_request(request, self.max_attempts))
            .await
    }

    /// Persist a prepared action, subject to the capacity limit.
    pub async fn enqueue_action(&self, action: QueuedAction) -> QueueResult<QueuedAction> {
        let stored = match self.store.insert(&action, self.capacity).await {
            Ok(stored) => stored,
            Err(err @ QueueError::CapacityExceeded { .. }) => {
                warn!(capacity = self.capacity, "offline queue full, action rejected");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        info!(
            action_id = %stored.id,
            method = %stored.method,
            endpoint = %stored.endpoint,
            "action queued for replay"
        );
        self.refresh_pending().await?;
        Ok(stored)
    }

    /// Replay pending actions in order through `scheduler`.
    #[instrument(skip_all)]
    pub async fn drain(&self, scheduler: &RequestScheduler) -> QueueResult<DrainReport> {
        let Ok(_running) = self.drain_lock.try_lock() else {
            debug!("drain already in progress");
            return Ok(DrainReport {
                already_running: true,
                ..DrainReport::default()
            });
        };

        let mut report = DrainReport::default();

        if scheduler.monitor().tier() == ConnectionTier::Offline {
            report.skipped_offline = true;
            report.remaining = self.store.count().await?;
            return Ok(report);
        }

        let actions = self.store.list_ordered().await?;
        info!(pending = actions.len(), "draining offline queue");

        for mut action in actions {
            if scheduler.monitor().tier() == ConnectionTier::Offline {
                report.stopped_early = true;
                break;
            }

            match scheduler.replay(action.to_request()).await {
                Ok(_) => {
                    self.remove(action.id).await?;
                    report.delivered += 1;
                    debug!(action_id = %action.id, "replayed action delivered");
                }
                Err(RequestError::Offline) => {
                    report.stopped_early = true;
                    break;
                }
                Err(error) if error.is_rejection() => {
                    action.record_failure(error.to_string());
                    self.abandon(&action, &error).await?;
                    report.failed_permanently += 1;
                }
                Err(error) => {
                    action.record_failure(error.to_string());
                    if action.is_exhausted() {
                        self.abandon(&action, &error).await?;
                        report.failed_permanently += 1;
                        continue;
                    }

                    warn!(
                        action_id = %action.id,
                        attempt = action.attempt_count,
                        max_attempts = action.max_attempts,
                        error = %error,
                        "replay failed, stopping drain"
                    );
                    self.store.update(&action).await?;
                    report.stopped_early = true;
                    break;
                }
            }
        }

        report.remaining = self.refresh_pending().await?;
        info!(
            delivered = report.delivered,
            failed = report.failed_permanently,
            remaining = report.remaining,
            "drain finished"
        );
        Ok(report)
    }

    async fn abandon(&self, action: &QueuedAction, error: &RequestError) -> QueueResult<()> {
        self.remove(action.id).await?;

        warn!(
            action_id = %action.id,
            attempts = action.attempt_count,
            error = %error,
            "action abandoned"
        );
        // Nobody listening is fine.
        let _ = self
            .failures
            .send(PermanentFailure::from_action(action, error.to_string()));
        Ok(())
    }

    /// Delete, tolerating a concurrent purge.
    async fn remove(&self, id: Uuid) -> QueueResult<()> {
        match self.store.delete(id).await {
            Ok(()) | Err(QueueError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn refresh_pending(&self) -> QueueResult<usize> {
        let count = self.store.count().await?;
        self.pending.send_replace(count);
        Ok(count)
    }

    /// Actions abandoned after exhausting their attempts.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<PermanentFailure> {
        self.failures.subscribe()
    }

    /// Watch the number of pending actions.
    pub fn pending(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }

    /// Pending actions according to the store.
    pub async fn pending_count(&self) -> QueueResult<usize> {
        self.store.count().await
    }

    /// Pending actions in replay order.
    pub async fn list(&self) -> QueueResult<Vec<QueuedAction>> {
        self.store.list_ordered().await
    }

    pub async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedAction>> {
        self.store.get(id).await
    }

    /// Drop every pending action without replaying it.
    pub async fn purge(&self) -> QueueResult<usize> {
        let removed = self.store.clear().await?;
        self.refresh_pending().await?;
        info!(removed, "offline queue purged");
        Ok(removed)
    }
}

#[async_trait]
impl ActionSink for OfflineActionQueue {
    async fn hand_off(
        &self,
        request: &ScheduledRequest,
        last_error: Option<&RequestError>,
    ) -> Result<Uuid, RequestError> {
        let mut action = QueuedAction::from_request(request, self.max_attempts);
        action.last_error = last_error.map(ToString::to_string);
        let stored = self.enqueue_action(action).await?;
        Ok(stored.id)
    }
}
