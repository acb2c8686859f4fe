//! Volatile ActionStore, for tests and hosts that opt out of persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::models::QueuedAction;
use crate::domain::ports::ActionStore;

#[derive(Default)]
struct Inner {
    actions: HashMap<Uuid, QueuedAction>,
    next_sequence: i64,
}

#[derive(Default)]
pub struct InMemoryActionStore {
    inner: RwLock<Inner>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn insert(&self, action: &QueuedAction, capacity: usize) -> QueueResult<QueuedAction> {
        let mut inner = self.inner.write().await;
        if inner.actions.len() >= capacity {
            return Err(QueueError::CapacityExceeded { capacity });
        }

        inner.next_sequence += 1;
        let mut stored = action.clone();
        stored.sequence = inner.next_sequence;
        inner.actions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, action: &QueuedAction) -> QueueResult<()> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .actions
            .get_mut(&action.id)
            .ok_or(QueueError::NotFound(action.id))?;
        existing.attempt_count = action.attempt_count;
        existing.max_attempts = action.max_attempts;
        existing.last_error.clone_from(&action.last_error);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> QueueResult<()> {
        self.inner
            .write()
            .await
            .actions
            .remove(&id)
            .map(|_| ())
            .ok_or(QueueError::NotFound(id))
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedAction>> {
        Ok(self.inner.read().await.actions.get(&id).cloned())
    }

    async fn list_ordered(&self) -> QueueResult<Vec<QueuedAction>> {
        let mut actions: Vec<_> = self.inner.read().await.actions.values().cloned().collect();
        actions.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(actions)
    }

    async fn count(&self) -> QueueResult<usize> {
        Ok(self.inner.read().await.actions.len())
    }

    async fn clear(&self) -> QueueResult<usize> {
        let mut inner = self.inner.write().await;
        let removed = inner.actions.len();
        inner.actions.clear();
        Ok(removed)
    }
}
