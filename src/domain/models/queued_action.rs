//! Persisted offline actions and their terminal failure event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::request::{HttpMethod, RequestPriority, ScheduledRequest, TargetDescriptor};

/// A mutating request waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    /// Id of the request that was handed off
    pub request_id: Uuid,
    pub method: HttpMethod,
    pub endpoint: String,
    pub content_type: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub headers: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
    /// Submission time of the originating request; replay order key.
    pub enqueued_at: DateTime<Utc>,
    /// Store-assigned insertion order; breaks `enqueued_at` ties.
    pub sequence: i64,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Capture a scheduled request for later replay.
    pub fn from_request(request: &ScheduledRequest, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            method: request.target.method,
            endpoint: request.target.endpoint.clone(),
            content_type: request.target.content_type.clone(),
            payload: request.target.body.clone(),
            headers: request.headers.clone(),
            idempotency_key: request
                .idempotency_key
                .clone()
                .or_else(|| Some(request.id.to_string())),
            enqueued_at: request.submitted_at,
            sequence: 0,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
        }
    }

    pub fn target(&self) -> TargetDescriptor {
        TargetDescriptor {
            method: self.method,
            endpoint: self.endpoint.clone(),
            content_type: self.content_type.clone(),
            body: self.payload.clone(),
        }
    }

    /// Rebuild a durable request with the original idempotency key.
    pub fn to_request(&self) -> ScheduledRequest {
        let mut request = ScheduledRequest::mutation(self.target())
            .with_priority(RequestPriority::High);
        request.headers = self.headers.clone();
        if let Some(key) = &self.idempotency_key {
            request = request.with_idempotency_key(key.clone());
        }
        request.durable()
    }

    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Count one failed replay; never exceeds `max_attempts`.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.last_error = Some(error.into());
    }
}

/// Broadcast when an action is abandoned after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentFailure {
    pub action_id: Uuid,
    pub request_id: Uuid,
    pub method: HttpMethod,
    pub endpoint: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl PermanentFailure {
    pub fn from_action(action: &QueuedAction, error: impl Into<String>) -> Self {
        Self {
            action_id: action.id,
            request_id: action.request_id,
            method: action.method,
            endpoint: action.endpoint.clone(),
            attempts: action.attempt_count,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}
