//! Connection monitor.
//!
//! Interprets host network signals into a `ConnectionProfile` and notifies
//! subscribers when, and only when, the classified tier changes. Noisy
//! link-quality updates that leave the tier alone refresh the snapshot
//! silently.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::domain::models::{ConnectionProfile, ConnectionTier, LinkQuality, NetworkSignals};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A tier transition, with the profiles on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct TierChange {
    /// Profile before the transition.
    pub previous: ConnectionProfile,
    /// Profile after the transition.
    pub current: ConnectionProfile,
}

impl TierChange {
    pub const fn from_tier(&self) -> ConnectionTier {
        self.previous.tier
    }

    pub const fn to_tier(&self) -> ConnectionTier {
        self.current.tier
    }

    /// Moving from a degraded tier into a usable one.
    pub const fn is_recovery(&self) -> bool {
        self.previous.tier.is_degraded() && !self.current.tier.is_degraded()
    }
}

type Listener = Arc<dyn Fn(&TierChange) + Send + Sync>;

struct MonitorState {
    signals: NetworkSignals,
    profile: ConnectionProfile,
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
    // Serialises reports so listeners see transitions in order.
    report_lock: Mutex<()>,
    sender: broadcast::Sender<TierChange>,
}

impl MonitorInner {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to the connection monitor; clones observe the same state.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectionMonitor {
    /// Classify the initial signals synchronously.
    pub fn new(signals: NetworkSignals) -> Self {
        let profile = ConnectionProfile::from_signals(&signals);
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        debug!(tier = %profile.tier, "connection monitor initialised");

        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState {
                    signals,
                    profile,
                    listeners: BTreeMap::new(),
                    next_listener_id: 0,
                }),
                report_lock: Mutex::new(()),
                sender,
            }),
        }
    }

    pub fn current(&self) -> ConnectionProfile {
        self.inner.state().profile.clone()
    }

    pub fn tier(&self) -> ConnectionTier {
        self.inner.state().profile.tier
    }

    /// Replace all signals and reclassify.
    ///
    /// Listeners run on the caller's thread before this returns; they must
    /// not call back into the monitor's reporting methods.
    pub fn report(&self, signals: NetworkSignals) -> Option<TierChange> {
        self.report_with(|current| *current = signals)
    }

    /// Explicit online/offline transition from the host.
    pub fn set_online(&self, online: bool) -> Option<TierChange> {
        self.report_with(|signals| signals.online = Some(online))
    }

    /// New link-quality reading (or its disappearance).
    pub fn update_link(&self, link: Option<LinkQuality>) -> Option<TierChange> {
        self.report_with(|signals| signals.link = link)
    }

    /// Edit the stored signals and reclassify as one step, so concurrent
    /// partial updates never overwrite each other.
    fn report_with<F>(&self, edit: F) -> Option<TierChange>
    where
        F: FnOnce(&mut NetworkSignals),
    {
        let _serial = self
            .inner
            .report_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (change, listeners) = {
            let mut state = self.inner.state();
            edit(&mut state.signals);
            let profile = ConnectionProfile::from_signals(&state.signals);

            if profile.tier == state.profile.tier {
                state.profile = profile;
                return None;
            }

            let previous = std::mem::replace(&mut state.profile, profile.clone());
            let listeners: Vec<Listener> = state.listeners.values().cloned().collect();
            (
                TierChange {
                    previous,
                    current: profile,
                },
                listeners,
            )
        };

        info!(
            from = %change.previous.tier,
            to = %change.current.tier,
            downlink_mbps = ?change.current.downlink_mbps,
            rtt_ms = ?change.current.round_trip_ms,
            "connection tier changed"
        );

        for listener in &listeners {
            listener(&change);
        }
        // No receivers is fine.
        let _ = self.inner.sender.send(change.clone());

        Some(change)
    }

    /// Register a callback for tier changes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TierChange) + Send + Sync + 'static,
    {
        let mut state = self.inner.state();
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.insert(id, Arc::new(listener));

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Async stream of tier changes.
    pub fn changes(&self) -> broadcast::Receiver<TierChange> {
        self.inner.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.state().listeners.len()
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(NetworkSignals::default())
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("profile", &self.current())
            .finish_non_exhaustive()
    }
}

/// Handle returned by `ConnectionMonitor::subscribe`.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    fn remove(&self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.state().listeners.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
