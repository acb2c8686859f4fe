//! Common test utilities for integration tests
//!
//! Provides a scriptable in-process transport, policy helpers and temporary
//! database fixtures shared across the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use seaworthy::domain::errors::RequestError;
use seaworthy::domain::models::{
    BehaviorConfig, ConnectionTier, PolicyTable, ResponsePayload, TargetDescriptor,
};
use seaworthy::domain::ports::Transport;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Responder = dyn Fn(&TargetDescriptor) -> Result<ResponsePayload, RequestError> + Send + Sync;

/// One request as seen by the transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub target: TargetDescriptor,
    pub headers: BTreeMap<String, String>,
}

/// In-process transport whose answers come from a closure.
///
/// Records every call and the peak number of overlapping calls. With a
/// latency set, each call sleeps before answering (on Tokio's clock, so
/// paused-time tests stay instant).
pub struct MockTransport {
    responder: Box<Responder>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&TargetDescriptor) -> Result<ResponsePayload, RequestError> + Send + Sync + 'static,
    {
        Self::with_latency(Duration::ZERO, responder)
    }

    pub fn with_latency<F>(latency: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&TargetDescriptor) -> Result<ResponsePayload, RequestError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            latency,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Answers every request with `200 ok`.
    pub fn ok() -> Arc<Self> {
        Self::new(|_| Ok(ResponsePayload::new(200, "ok")))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Endpoints in the order they reached the transport.
    pub fn endpoints(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.target.endpoint)
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        target: &TargetDescriptor,
        headers: &BTreeMap<String, String>,
    ) -> Result<ResponsePayload, RequestError> {
        self.calls.lock().unwrap().push(RecordedCall {
            target: target.clone(),
            headers: headers.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(target)
    }
}

pub fn unavailable() -> RequestError {
    RequestError::ServerUnavailable {
        status: 503,
        message: "maintenance window".to_string(),
    }
}

pub fn rejected() -> RequestError {
    RequestError::ClientRejected {
        status: 422,
        message: "unprocessable".to_string(),
    }
}

/// Default policy with one tier row replaced.
pub fn policy_with(tier: ConnectionTier, edit: impl FnOnce(&mut BehaviorConfig)) -> PolicyTable {
    let mut table = PolicyTable::default();
    let row = match tier {
        ConnectionTier::Fast => &mut table.fast,
        ConnectionTier::Moderate => &mut table.moderate,
        ConnectionTier::Slow => &mut table.slow,
        ConnectionTier::Offline => &mut table.offline,
    };
    edit(row);
    table
}

/// Policy where online tiers give up after one attempt with no backoff.
pub fn single_attempt_policy() -> PolicyTable {
    let mut table = PolicyTable::default();
    for row in [&mut table.fast, &mut table.moderate, &mut table.slow] {
        row.max_retry_attempts = 1;
        row.backoff_base_ms = 1;
        row.backoff_cap_ms = 1;
    }
    table
}

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Path to a SQLite database file inside a fresh temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let db_path = dir.path().join("queue.db");
    (dir, db_path)
}

pub fn sqlite_url(path: &std::path::Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
