//! Wiring of the resilience components.
//!
//! `ResilienceLayer` owns one instance of each component, built explicitly
//! from `Config`, and runs the background task that drains the offline
//! queue whenever the link recovers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::{QueueResult, RequestError};
use crate::domain::models::{
    Config, ConnectionProfile, NetworkSignals, PermanentFailure, RequestOutcome,
    ScheduledRequest,
};
use crate::domain::ports::{ActionSink, ActionStore, Transport};
use crate::services::adaptive_config::AdaptiveConfigResolver;
use crate::services::backoff::{JitterSource, RandomJitter};
use crate::services::connection_monitor::{ConnectionMonitor, Subscription, TierChange};
use crate::services::offline_queue::{DrainReport, OfflineActionQueue};
use crate::services::request_scheduler::RequestScheduler;
use crate::services::response_cache::ResponseCache;

/// One monitor, scheduler and offline queue wired together.
///
/// Dropping the layer stops its background drains; requests already handed
/// to the transport still complete.
pub struct ResilienceLayer {
    monitor: ConnectionMonitor,
    scheduler: RequestScheduler,
    queue: Arc<OfflineActionQueue>,
    auto_drain: JoinHandle<()>,
    startup_drain: Option<JoinHandle<()>>,
}

impl ResilienceLayer {
    /// Build every component and start the automatic drain task.
    pub async fn start(
        config: &Config,
        signals: NetworkSignals,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ActionStore>,
    ) -> QueueResult<Self> {
        Self::start_with_jitter(config, signals, transport, store, Arc::new(RandomJitter)).await
    }

    /// Like [`ResilienceLayer::start`] with a fixed jitter source.
    pub async fn start_with_jitter(
        config: &Config,
        signals: NetworkSignals,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ActionStore>,
        jitter: Arc<dyn JitterSource>,
    ) -> QueueResult<Self> {
        let monitor = ConnectionMonitor::new(signals);
        let queue = Arc::new(OfflineActionQueue::open(store, &config.offline_queue).await?);

        let scheduler = RequestScheduler::builder(monitor.clone(), transport)
            .resolver(AdaptiveConfigResolver::with_table(config.policy.clone()))
            .cache(Arc::new(ResponseCache::new(config.cache.max_entries)))
            .offline_queue(Arc::clone(&queue) as Arc<dyn ActionSink>)
            .jitter(jitter)
            .build();

        let auto_drain = tokio::spawn(auto_drain(
            monitor.changes(),
            Arc::clone(&queue),
            scheduler.clone(),
        ));

        let mut layer = Self {
            monitor,
            scheduler,
            queue,
            auto_drain,
            startup_drain: None,
        };

        let pending = layer.queue.pending_count().await?;
        info!(tier = %layer.monitor.tier(), pending, "resilience layer started");

        if pending > 0 && !layer.monitor.tier().is_degraded() {
            let queue = Arc::clone(&layer.queue);
            let scheduler = layer.scheduler.clone();
            layer.startup_drain = Some(tokio::spawn(async move {
                run_drain(&queue, &scheduler).await;
            }));
        }

        Ok(layer)
    }

    /// Submit a request through the scheduler.
    pub async fn submit(&self, request: ScheduledRequest) -> Result<RequestOutcome, RequestError> {
        self.scheduler.submit(request).await
    }

    /// Replay the offline queue now.
    pub async fn drain(&self) -> QueueResult<DrainReport> {
        self.queue.drain(&self.scheduler).await
    }

    /// Feed new host signals to the monitor.
    pub fn report(&self, signals: NetworkSignals) -> Option<TierChange> {
        self.monitor.report(signals)
    }

    /// Current connection profile.
    pub fn profile(&self) -> ConnectionProfile {
        self.monitor.current()
    }

    /// Register a callback for tier changes.
    pub fn on_connection_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TierChange) + Send + Sync + 'static,
    {
        self.monitor.subscribe(listener)
    }

    /// Actions the offline queue gave up on.
    pub fn permanent_failures(&self) -> broadcast::Receiver<PermanentFailure> {
        self.queue.subscribe_failures()
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    pub fn queue(&self) -> &Arc<OfflineActionQueue> {
        &self.queue
    }
}

impl Drop for ResilienceLayer {
    fn drop(&mut self) {
        self.auto_drain.abort();
        if let Some(handle) = self.startup_drain.take() {
            handle.abort();
        }
    }
}

async fn auto_drain(
    mut changes: broadcast::Receiver<TierChange>,
    queue: Arc<OfflineActionQueue>,
    scheduler: RequestScheduler,
) {
    loop {
        let recovered = match changes.recv().await {
            Ok(change) => change.is_recovery(),
            // Missed transitions: decide on the current tier instead.
            Err(broadcast::error::RecvError::Lagged(_)) => !scheduler.monitor().tier().is_degraded(),
            Err(broadcast::error::RecvError::Closed) => return,
        };

        if recovered {
            debug!("link recovered, draining offline queue");
            run_drain(&queue, &scheduler).await;
        }
    }
}

async fn run_drain(queue: &OfflineActionQueue, scheduler: &RequestScheduler) {
    if let Err(err) = queue.drain(scheduler).await {
        warn!(error = %err, "automatic drain failed");
    }
}
