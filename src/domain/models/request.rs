//! Outbound request model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::RequestError;

/// Header carrying the idempotency key of durable requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Reads that may be cached and collapsed.
    pub const fn is_idempotent_read(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to call: method, endpoint and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub method: HttpMethod,
    /// Path plus optional query string, relative to the transport's base URL
    pub endpoint: String,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl TargetDescriptor {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            content_type: None,
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = Some(body.into());
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_body("application/json", body)
    }

    /// Canonical identity used for dedup and cache keys.
    ///
    /// Format: `METHOD path?sorted-query#sha256(canonical body)`. Query
    /// parameters are sorted; JSON bodies are re-serialised with sorted
    /// object keys before hashing so that key order does not matter. An
    /// absent or empty body contributes no `#` suffix.
    pub fn fingerprint(&self) -> String {
        let mut key = format!("{} {}", self.method, canonical_endpoint(&self.endpoint));

        if let Some(body) = self.body.as_deref().filter(|b| !b.is_empty()) {
            let canonical = self.canonical_body(body);
            let digest = Sha256::digest(&canonical);
            key.push('#');
            key.push_str(&hex::encode(digest));
        }

        key
    }

    fn canonical_body(&self, body: &[u8]) -> Vec<u8> {
        let is_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

        if is_json {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
                if let Ok(canonical) = serde_json::to_vec(&sorted_json(value)) {
                    return canonical;
                }
            }
        }
        body.to_vec()
    }
}

/// Rebuild objects with keys inserted in sorted order, recursively.
fn sorted_json(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sorted_json(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_json).collect()),
        other => other,
    }
}

fn canonical_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let (path, query) = match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    };

    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    let Some(query) = query else {
        return path.to_string();
    };

    let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    if params.is_empty() {
        return path.to_string();
    }
    params.sort_unstable();
    format!("{path}?{}", params.join("&"))
}

/// Dispatch priority; `Critical` is served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl RequestPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Always go to the network, never store.
    #[default]
    Bypass,
    /// Serve from cache when fresh, otherwise fetch and store.
    PreferCache,
    /// Serve from cache or fail with `CacheMiss`.
    CacheOnly,
}

/// A unit of work submitted to the request scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRequest {
    pub id: Uuid,
    pub target: TargetDescriptor,
    pub headers: BTreeMap<String, String>,
    pub priority: RequestPriority,
    pub dedup_key: Option<String>,
    pub cache_policy: CachePolicy,
    /// Exhaustion while offline defers to the offline queue instead of failing.
    pub durable: bool,
    pub idempotency_key: Option<String>,
    /// Cache key prefixes a successful mutation makes stale
    pub invalidates: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ScheduledRequest {
    fn new(target: TargetDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            headers: BTreeMap::new(),
            priority: RequestPriority::Normal,
            dedup_key: None,
            cache_policy: CachePolicy::Bypass,
            durable: false,
            idempotency_key: None,
            invalidates: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    /// Idempotent read: deduplicated by fingerprint and served from cache.
    pub fn read(target: TargetDescriptor) -> Self {
        let mut request = Self::new(target);
        request.dedup_key = Some(request.target.fingerprint());
        request.cache_policy = CachePolicy::PreferCache;
        request
    }

    /// Mutating call: never cached, never collapsed.
    pub fn mutation(target: TargetDescriptor) -> Self {
        Self::new(target)
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Mark as durable; assigns the request id as idempotency key unless one is set.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        if self.idempotency_key.is_none() {
            self.idempotency_key = Some(self.id.to_string());
        }
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn invalidating(mut self, prefix: impl Into<String>) -> Self {
        self.invalidates.push(prefix.into());
        self
    }

    pub const fn is_idempotent_read(&self) -> bool {
        self.target.method.is_idempotent_read()
    }

    /// Key under which the response is cached, if caching applies.
    pub fn cache_key(&self) -> Option<&str> {
        if self.is_idempotent_read() && self.cache_policy != CachePolicy::Bypass {
            self.dedup_key.as_deref()
        } else {
            None
        }
    }

    /// Headers sent on the wire, including the idempotency key.
    pub fn wire_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(key) = &self.idempotency_key {
            headers.insert(IDEMPOTENCY_KEY_HEADER.to_string(), key.clone());
        }
        headers
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.target.endpoint.trim().is_empty() {
            return Err(RequestError::InvalidRequest("endpoint cannot be empty".to_string()));
        }

        let read = self.is_idempotent_read();
        if !read && self.dedup_key.is_some() {
            return Err(RequestError::InvalidRequest(format!(
                "{} requests cannot be deduplicated",
                self.target.method
            )));
        }
        if !read && self.cache_policy != CachePolicy::Bypass {
            return Err(RequestError::InvalidRequest(format!(
                "{} requests cannot use the response cache",
                self.target.method
            )));
        }
        if read && self.durable {
            return Err(RequestError::InvalidRequest(
                "only mutating requests can be durable".to_string(),
            ));
        }
        if self.cache_policy == CachePolicy::CacheOnly && self.dedup_key.is_none() {
            return Err(RequestError::InvalidRequest(
                "cache-only reads need a dedup key".to_string(),
            ));
        }
        Ok(())
    }
}

/// Response body as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ResponsePayload {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Successful resolution of a submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Delivered {
        payload: Arc<ResponsePayload>,
        from_cache: bool,
    },
    /// Accepted for later delivery by the offline queue.
    Deferred { action_id: Uuid },
}

impl RequestOutcome {
    pub fn payload(&self) -> Option<&Arc<ResponsePayload>> {
        match self {
            Self::Delivered { payload, .. } => Some(payload),
            Self::Deferred { .. } => None,
        }
    }

    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}
