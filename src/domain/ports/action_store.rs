use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::{QueueResult, RequestError};
use crate::domain::models::{QueuedAction, ScheduledRequest};

/// Durable id -> `QueuedAction` mapping backing the offline queue.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Persist a new action, assigning its `sequence`.
    ///
    /// Fails with `QueueError::CapacityExceeded` when `capacity` actions are
    /// already stored.
    async fn insert(&self, action: &QueuedAction, capacity: usize) -> QueueResult<QueuedAction>;

    /// Overwrite the attempt bookkeeping of an existing action.
    async fn update(&self, action: &QueuedAction) -> QueueResult<()>;

    async fn delete(&self, id: Uuid) -> QueueResult<()>;

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedAction>>;

    /// All actions in replay order: `enqueued_at`, then `sequence`.
    async fn list_ordered(&self) -> QueueResult<Vec<QueuedAction>>;

    async fn count(&self) -> QueueResult<usize>;

    /// Remove every action, returning how many were removed.
    async fn clear(&self) -> QueueResult<usize>;
}

/// Receiver of durable requests the scheduler could not deliver.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Persist the request for later replay and return the action id.
    async fn hand_off(
        &self,
        request: &ScheduledRequest,
        last_error: Option<&RequestError>,
    ) -> Result<Uuid, RequestError>;
}
