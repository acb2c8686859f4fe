//! Domain errors for the resilience layer.

use thiserror::Error;
use uuid::Uuid;

/// Failure of a single scheduled request.
///
/// `Clone` because deduplicated callers all observe the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Server unavailable ({status}): {message}")]
    ServerUnavailable { status: u16, message: String },

    #[error("Request rejected ({status}): {message}")]
    ClientRejected { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No cached response for {0}")]
    CacheMiss(String),

    #[error("Offline action queue is full (capacity {capacity})")]
    QueueCapacityExceeded { capacity: usize },

    #[error("Offline action store failure: {0}")]
    Storage(String),

    #[error("Durable request cannot be deferred: no offline queue attached")]
    HandoffUnavailable,

    #[error("Connection is offline")]
    Offline,

    #[error("Request task aborted: {0}")]
    Aborted(String),
}

impl RequestError {
    /// Whether the scheduler may spend another attempt on this failure.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::ServerUnavailable { .. } | Self::Offline
        )
    }

    /// Failures the backend will never accept, however often they are replayed.
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::ClientRejected { .. } | Self::InvalidRequest(_))
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self::TransientNetwork(format!("timed out after {after_ms}ms"))
    }
}

/// Errors raised by the offline action queue and its stores.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Offline action queue is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Queued action not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<QueueError> for RequestError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::CapacityExceeded { capacity } => Self::QueueCapacityExceeded { capacity },
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(RequestError::TransientNetwork("reset".into()).is_retryable());
        assert!(RequestError::timeout(500).is_retryable());
        assert!(RequestError::ServerUnavailable {
            status: 503,
            message: String::new()
        }
        .is_retryable());

        assert!(!RequestError::ClientRejected {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!RequestError::InvalidRequest("empty endpoint".into()).is_retryable());
        assert!(!RequestError::CacheMiss("GET /a".into()).is_retryable());
    }

    #[test]
    fn test_capacity_error_maps_to_request_error() {
        let err: RequestError = QueueError::CapacityExceeded { capacity: 3 }.into();
        assert_eq!(err, RequestError::QueueCapacityExceeded { capacity: 3 });

        let err: RequestError = QueueError::Storage("disk full".into()).into();
        assert!(matches!(err, RequestError::Storage(msg) if msg.contains("disk full")));
    }
}
