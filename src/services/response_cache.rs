//! TTL cache for idempotent read responses.
//!
//! Expiry is lazy: an entry older than its TTL is evicted when it is read.
//! There is no background sweep. The entry count is bounded; a put into a
//! full cache first drops expired entries, then the oldest one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::domain::models::ResponsePayload;
use crate::domain::ports::{Clock, TokioClock};

pub const DEFAULT_MAX_ENTRIES: usize = 512;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Arc<ResponsePayload>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(TokioClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            max_entries: max_entries.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh payload for `key`, or `None`. Evicts the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<Arc<ResponsePayload>> {
        let now = self.clock.now();
        let mut entries = self.entries();

        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.remove(key);
            trace!(key, "cache entry expired");
            None
        } else {
            entries.get(key).map(|entry| Arc::clone(&entry.payload))
        }
    }

    pub fn put(&self, key: impl Into<String>, payload: Arc<ResponsePayload>, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = self.entries();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| !entry.is_expired(now));

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .values()
                    .min_by_key(|entry| entry.stored_at)
                    .map(|entry| entry.key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload,
                stored_at: now,
                ttl,
            },
        );
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Drop every key starting with `prefix`. Returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
