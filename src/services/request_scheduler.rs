//! Request scheduler: the single dispatcher of outbound calls.
//!
//! Every request moves through
//! `Queued -> Dispatched -> {Succeeded | FailedRetryable -> Queued | FailedTerminal | HandedOff}`.
//!
//! - At most `max_concurrent_requests` (read from the resolver for the
//!   current tier at every decision) are dispatched at once.
//! - Queued requests leave in priority order, FIFO within a priority.
//!   Dispatch is non-preemptive.
//! - Reads consult the response cache and the deduplicator before they are
//!   queued.
//! - Retryable failures re-enter the queue after an exponential backoff,
//!   keeping their original submission position.
//! - While offline nothing is dispatched: ordinary requests wait without
//!   spending attempts, durable ones are handed off to the offline queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::RequestError;
use crate::domain::models::{
    BehaviorConfig, CachePolicy, ConnectionTier, RequestOutcome, RequestPriority, ResponsePayload,
    ScheduledRequest,
};
use crate::domain::ports::{ActionSink, Transport};
use crate::services::adaptive_config::AdaptiveConfigResolver;
use crate::services::backoff::{backoff_delay, JitterSource, RandomJitter};
use crate::services::connection_monitor::{ConnectionMonitor, TierChange};
use crate::services::request_deduplicator::RequestDeduplicator;
use crate::services::response_cache::ResponseCache;

type Responder = oneshot::Sender<Result<RequestOutcome, RequestError>>;

/// Who is waiting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchMode {
    /// An application caller; durable requests may be handed off.
    Caller,
    /// A replay from the offline queue; never handed off again.
    Replay,
}

struct Pending {
    request: ScheduledRequest,
    sequence: u64,
    attempts_made: u32,
    mode: DispatchMode,
    last_error: Option<RequestError>,
    responder: Responder,
}

impl Pending {
    fn resolve(self, result: Result<RequestOutcome, RequestError>) {
        // The caller may have stopped listening.
        let _ = self.responder.send(result);
    }

    const fn queue_key(&self) -> (RequestPriority, u64) {
        (self.request.priority, self.sequence)
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: BTreeMap<(RequestPriority, u64), Pending>,
    dispatched: usize,
    backing_off: usize,
    peak_dispatched: usize,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tier the monitor reports right now.
    pub tier: ConnectionTier,
    /// Requests waiting for a dispatch slot.
    pub queued: usize,
    /// Requests currently with the transport.
    pub dispatched: usize,
    /// Failed requests sleeping before they re-enter the queue.
    pub backing_off: usize,
    /// Highest `dispatched` value seen since construction.
    pub peak_dispatched: usize,
    /// Concurrency limit of the current tier.
    pub max_concurrent_requests: usize,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    sequence: AtomicU64,
    monitor: ConnectionMonitor,
    resolver: AdaptiveConfigResolver,
    cache: Arc<ResponseCache>,
    dedup: RequestDeduplicator<RequestOutcome>,
    transport: Arc<dyn Transport>,
    sink: Option<Arc<dyn ActionSink>>,
    jitter: Arc<dyn JitterSource>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_config(&self) -> (ConnectionTier, BehaviorConfig) {
        let tier = self.monitor.tier();
        (tier, self.resolver.resolve(tier))
    }

    async fn enqueue(
        self: Arc<Self>,
        request: ScheduledRequest,
        mode: DispatchMode,
    ) -> Result<RequestOutcome, RequestError> {
        let (responder, outcome) = oneshot::channel();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let pending = Pending {
            request,
            sequence,
            attempts_made: 0,
            mode,
            last_error: None,
            responder,
        };

        debug!(
            request_id = %pending.request.id,
            priority = pending.request.priority.as_str(),
            "request queued"
        );
        self.state().queue.insert(pending.queue_key(), pending);
        self.pump();

        outcome
            .await
            .unwrap_or_else(|_| Err(RequestError::Aborted("scheduler dropped the request".to_string())))
    }

    /// Make every dispatch decision the current tier allows.
    fn pump(self: &Arc<Self>) {
        let (tier, config) = self.live_config();
        let mut to_dispatch = Vec::new();
        let mut to_hand_off = Vec::new();
        let mut to_fail = Vec::new();

        {
            let mut state = self.state();

            if tier == ConnectionTier::Offline {
                let durable: Vec<_> = state
                    .queue
                    .iter()
                    .filter(|(_, pending)| pending.request.durable)
                    .map(|(key, _)| *key)
                    .collect();

                for key in durable {
                    if let Some(pending) = state.queue.remove(&key) {
                        match pending.mode {
                            DispatchMode::Caller => to_hand_off.push(pending),
                            DispatchMode::Replay => to_fail.push(pending),
                        }
                    }
                }
            } else {
                while state.dispatched < config.max_concurrent_requests {
                    let Some((_, pending)) = state.queue.pop_first() else {
                        break;
                    };
                    state.dispatched += 1;
                    state.peak_dispatched = state.peak_dispatched.max(state.dispatched);
                    to_dispatch.push(pending);
                }
            }
        }

        for pending in to_dispatch {
            tokio::spawn(Arc::clone(self).dispatch(pending, config));
        }
        if !to_hand_off.is_empty() {
            // One task, submission order: later mutations may depend on earlier ones.
            to_hand_off.sort_by_key(|pending| pending.sequence);
            tokio::spawn(Arc::clone(self).hand_off_in_order(to_hand_off));
        }
        for pending in to_fail {
            pending.resolve(Err(RequestError::Offline));
        }
    }

    async fn dispatch(self: Arc<Self>, mut pending: Pending, config: BehaviorConfig) {
        pending.attempts_made += 1;
        let headers = pending.request.wire_headers();

        debug!(
            request_id = %pending.request.id,
            attempt = pending.attempts_made,
            endpoint = %pending.request.target.endpoint,
            "dispatching request"
        );

        let sent = tokio::time::timeout(
            config.request_timeout(),
            self.transport.send(&pending.request.target, &headers),
        )
        .await;
        let result = sent.unwrap_or_else(|_| Err(RequestError::timeout(config.request_timeout_ms)));

        self.state().dispatched -= 1;

        match result {
            Ok(payload) => self.complete(pending, payload),
            Err(error) => self.fail(pending, error),
        }

        self.pump();
    }

    fn complete(&self, pending: Pending, payload: ResponsePayload) {
        let (_, config) = self.live_config();
        let payload = Arc::new(payload);

        if let Some(key) = pending.request.cache_key() {
            self.cache.put(key, Arc::clone(&payload), config.cache_ttl());
        }
        for prefix in &pending.request.invalidates {
            let dropped = self.cache.invalidate_prefix(prefix);
            if dropped > 0 {
                debug!(prefix = %prefix, dropped, "invalidated cached reads");
            }
        }

        debug!(
            request_id = %pending.request.id,
            attempts = pending.attempts_made,
            status = payload.status,
            "request succeeded"
        );
        pending.resolve(Ok(RequestOutcome::Delivered {
            payload,
            from_cache: false,
        }));
    }

    fn fail(self: &Arc<Self>, mut pending: Pending, error: RequestError) {
        let (tier, config) = self.live_config();
        let request_id = pending.request.id;

        if !error.is_retryable() {
            warn!(%request_id, attempts = pending.attempts_made, error = %error, "request failed terminally");
            pending.resolve(Err(error));
            return;
        }

        let exhausted = pending.attempts_made >= config.max_retry_attempts;
        let offline = tier == ConnectionTier::Offline;

        if pending.request.durable && pending.mode == DispatchMode::Caller && (exhausted || offline) {
            pending.last_error = Some(error);
            tokio::spawn(Arc::clone(self).hand_off(pending));
            return;
        }

        if offline && !pending.request.durable {
            // Retrying cannot help until the link is back; wait in the queue.
            debug!(%request_id, "holding request while offline");
            pending.last_error = Some(error);
            self.state().queue.insert(pending.queue_key(), pending);
            return;
        }

        if exhausted {
            warn!(%request_id, attempts = pending.attempts_made, error = %error, "retry budget exhausted");
            pending.resolve(Err(error));
            return;
        }

        let delay = backoff_delay(pending.attempts_made, &config, self.jitter.sample());
        debug!(%request_id, attempt = pending.attempts_made, ?delay, error = %error, "retrying after backoff");
        pending.last_error = Some(error);
        self.state().backing_off += 1;

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.state();
                state.backing_off -= 1;
                state.queue.insert(pending.queue_key(), pending);
            }
            inner.pump();
        });
    }

    async fn hand_off_in_order(self: Arc<Self>, batch: Vec<Pending>) {
        for pending in batch {
            Arc::clone(&self).hand_off(pending).await;
        }
    }

    async fn hand_off(self: Arc<Self>, pending: Pending) {
        let request_id = pending.request.id;
        let result = match &self.sink {
            Some(sink) => sink
                .hand_off(&pending.request, pending.last_error.as_ref())
                .await
                .map(|action_id| RequestOutcome::Deferred { action_id }),
            None => Err(RequestError::HandoffUnavailable),
        };

        match &result {
            Ok(RequestOutcome::Deferred { action_id }) => {
                info!(%request_id, %action_id, "request deferred to offline queue");
            }
            Err(error) => warn!(%request_id, error = %error, "hand-off failed"),
            Ok(_) => {}
        }
        pending.resolve(result);
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = watcher {
            handle.abort();
        }
    }
}

/// Shared handle to the scheduler.
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<SchedulerInner>,
}

impl RequestScheduler {
    /// Start building a scheduler over `transport`, driven by `monitor`.
    pub fn builder(monitor: ConnectionMonitor, transport: Arc<dyn Transport>) -> SchedulerBuilder {
        SchedulerBuilder {
            monitor,
            transport,
            resolver: AdaptiveConfigResolver::default(),
            cache: None,
            sink: None,
            jitter: Arc::new(RandomJitter),
        }
    }

    /// Submit a request; resolves exactly once.
    #[instrument(
        skip(self, request),
        fields(request_id = %request.id, method = %request.target.method, endpoint = %request.target.endpoint)
    )]
    pub async fn submit(&self, request: ScheduledRequest) -> Result<RequestOutcome, RequestError> {
        request.validate()?;

        if let Some(key) = request.cache_key() {
            if let Some(payload) = self.inner.cache.get(key) {
                debug!("served from cache");
                return Ok(RequestOutcome::Delivered {
                    payload,
                    from_cache: true,
                });
            }
            if request.cache_policy == CachePolicy::CacheOnly {
                return Err(RequestError::CacheMiss(key.to_string()));
            }
        }

        let collapsible = request.cache_policy != CachePolicy::Bypass;
        if let (Some(key), true) = (request.dedup_key.clone(), collapsible) {
            let inner = Arc::clone(&self.inner);
            return self
                .inner
                .dedup
                .dedupe(&key, move || inner.enqueue(request, DispatchMode::Caller))
                .await;
        }

        Arc::clone(&self.inner)
            .enqueue(request, DispatchMode::Caller)
            .await
    }

    /// Replay a deferred action; the outcome is never another hand-off.
    pub(crate) async fn replay(&self, request: ScheduledRequest) -> Result<RequestOutcome, RequestError> {
        request.validate()?;
        Arc::clone(&self.inner)
            .enqueue(request, DispatchMode::Replay)
            .await
    }

    /// Re-run dispatch decisions, e.g. after an external state change.
    ///
    /// # Panics
    ///
    /// Dispatches and hand-offs are spawned onto the ambient Tokio runtime,
    /// so this panics when called from outside one.
    pub fn pump(&self) {
        self.inner.pump();
    }

    /// Response cache consulted before reads are queued.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.inner.cache
    }

    /// Monitor whose tier drives every dispatch decision.
    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.inner.monitor
    }

    /// Resolver mapping tiers to behaviour.
    pub fn resolver(&self) -> &AdaptiveConfigResolver {
        &self.inner.resolver
    }

    /// Snapshot of queue depth and concurrency.
    pub fn stats(&self) -> SchedulerStats {
        let (tier, config) = self.inner.live_config();
        let state = self.inner.state();
        SchedulerStats {
            tier,
            queued: state.queue.len(),
            dispatched: state.dispatched,
            backing_off: state.backing_off,
            peak_dispatched: state.peak_dispatched,
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }
}

/// Builder returned by [`RequestScheduler::builder`].
pub struct SchedulerBuilder {
    monitor: ConnectionMonitor,
    transport: Arc<dyn Transport>,
    resolver: AdaptiveConfigResolver,
    cache: Option<Arc<ResponseCache>>,
    sink: Option<Arc<dyn ActionSink>>,
    jitter: Arc<dyn JitterSource>,
}

impl SchedulerBuilder {
    /// Replace the default policy table.
    #[must_use]
    pub fn resolver(mut self, resolver: AdaptiveConfigResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share an existing cache instead of creating one.
    #[must_use]
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Where durable requests go when they cannot be delivered.
    #[must_use]
    pub fn offline_queue(mut self, sink: Arc<dyn ActionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the scheduler. Must run inside a Tokio runtime: a background
    /// task re-pumps the queue on every tier change.
    pub fn build(self) -> RequestScheduler {
        let changes = self.monitor.changes();
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState::default()),
            sequence: AtomicU64::new(0),
            monitor: self.monitor,
            resolver: self.resolver,
            cache: self.cache.unwrap_or_default(),
            dedup: RequestDeduplicator::new(),
            transport: self.transport,
            sink: self.sink,
            jitter: self.jitter,
            watcher: Mutex::new(None),
        });

        let handle = tokio::spawn(watch_tier_changes(Arc::downgrade(&inner), changes));
        *inner.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        RequestScheduler { inner }
    }
}

async fn watch_tier_changes(
    inner: Weak<SchedulerInner>,
    mut changes: broadcast::Receiver<TierChange>,
) {
    loop {
        match changes.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NetworkSignals, TargetDescriptor};
    use crate::services::backoff::FixedJitter;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::AtomicU32;

    /// Transport answering from a script, then succeeding.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ResponsePayload, RequestError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ResponsePayload, RequestError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _target: &TargetDescriptor,
            _headers: &BTreeMap<String, String>,
        ) -> Result<ResponsePayload, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ResponsePayload::new(200, "ok")))
        }
    }

    fn scheduler(transport: Arc<ScriptedTransport>) -> RequestScheduler {
        RequestScheduler::builder(ConnectionMonitor::new(NetworkSignals::online()), transport)
            .jitter(Arc::new(FixedJitter(0.0)))
            .build()
    }

    fn unavailable() -> RequestError {
        RequestError::ServerUnavailable {
            status: 503,
            message: "busy".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let transport = ScriptedTransport::new(vec![Err(unavailable()), Err(unavailable())]);
        let scheduler = scheduler(Arc::clone(&transport));

        let outcome = scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("/log")))
            .await
            .unwrap();

        assert_eq!(outcome.payload().unwrap().body, b"ok");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_fails_non_durable() {
        let transport = ScriptedTransport::new(vec![Err(unavailable()); 10]);
        let scheduler = scheduler(Arc::clone(&transport));

        let result = scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("/log")))
            .await;

        assert_eq!(result, Err(unavailable()));
        // moderate tier: four attempts in total
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_rejection_is_never_retried() {
        let rejected = RequestError::ClientRejected {
            status: 422,
            message: "bad".to_string(),
        };
        let transport = ScriptedTransport::new(vec![Err(rejected.clone())]);
        let scheduler = scheduler(Arc::clone(&transport));

        let result = scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("/log")).durable())
            .await;

        assert_eq!(result, Err(rejected));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_durable_without_queue_reports_handoff_unavailable() {
        let transport = ScriptedTransport::new(vec![Err(unavailable()); 10]);
        let scheduler = scheduler(transport);

        let result = scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("/log")).durable())
            .await;
        assert_eq!(result, Err(RequestError::HandoffUnavailable));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_dispatch() {
        let transport = ScriptedTransport::new(vec![]);
        let scheduler = scheduler(Arc::clone(&transport));

        let result = scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("")))
            .await;
        assert!(matches!(result, Err(RequestError::InvalidRequest(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_only_miss() {
        let transport = ScriptedTransport::new(vec![]);
        let scheduler = scheduler(Arc::clone(&transport));

        let request = ScheduledRequest::read(TargetDescriptor::get("/weather"))
            .with_cache_policy(CachePolicy::CacheOnly);
        let result = scheduler.submit(request).await;

        assert_eq!(result, Err(RequestError::CacheMiss("GET /weather".to_string())));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_mutation_invalidates_prefix() {
        let transport = ScriptedTransport::new(vec![]);
        let scheduler = scheduler(Arc::clone(&transport));

        scheduler
            .submit(ScheduledRequest::read(TargetDescriptor::get("/crew")))
            .await
            .unwrap();
        assert_eq!(scheduler.cache().len(), 1);

        scheduler
            .submit(ScheduledRequest::mutation(TargetDescriptor::post("/crew")).invalidating("GET /crew"))
            .await
            .unwrap();
        assert!(scheduler.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stats_start_idle() {
        let scheduler = scheduler(ScriptedTransport::new(vec![]));
        let stats = scheduler.stats();
        assert_eq!(stats.tier, ConnectionTier::Moderate);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.max_concurrent_requests, 4);
    }
}
