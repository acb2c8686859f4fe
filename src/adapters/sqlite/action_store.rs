//! SQLite implementation of the ActionStore.

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::models::{HttpMethod, QueuedAction};
use crate::domain::ports::ActionStore;

#[derive(Clone)]
pub struct SqliteActionStore {
    pool: SqlitePool,
}

impl SqliteActionStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Fixed-width so that lexical order equals chronological order.
fn timestamp(action: &QueuedAction) -> String {
    action.enqueued_at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl ActionStore for SqliteActionStore {
    async fn insert(&self, action: &QueuedAction, capacity: usize) -> QueueResult<QueuedAction> {
        let headers_json = serde_json::to_string(&action.headers)?;
        let capacity_limit = i64::try_from(capacity).unwrap_or(i64::MAX);

        // Count and insert in one statement so concurrent writers cannot overshoot.
        let result = sqlx::query(
            r#"INSERT INTO offline_actions (id, request_id, method, endpoint, content_type, payload,
               headers, idempotency_key, enqueued_at, attempt_count, max_attempts, last_error)
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE (SELECT COUNT(*) FROM offline_actions) < ?"#,
        )
        .bind(action.id.to_string())
        .bind(action.request_id.to_string())
        .bind(action.method.as_str())
        .bind(&action.endpoint)
        .bind(&action.content_type)
        .bind(&action.payload)
        .bind(&headers_json)
        .bind(&action.idempotency_key)
        .bind(timestamp(action))
        .bind(i64::from(action.attempt_count))
        .bind(i64::from(action.max_attempts))
        .bind(&action.last_error)
        .bind(capacity_limit)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::CapacityExceeded { capacity });
        }

        let mut stored = action.clone();
        stored.sequence = result.last_insert_rowid();
        Ok(stored)
    }

    async fn update(&self, action: &QueuedAction) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE offline_actions SET attempt_count = ?, max_attempts = ?, last_error = ? WHERE id = ?",
        )
        .bind(i64::from(action.attempt_count))
        .bind(i64::from(action.max_attempts))
        .bind(&action.last_error)
        .bind(action.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(action.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> QueueResult<()> {
        let result = sqlx::query("DELETE FROM offline_actions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedAction>> {
        let row: Option<ActionRow> = sqlx::query_as("SELECT * FROM offline_actions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueuedAction::try_from).transpose()
    }

    async fn list_ordered(&self) -> QueueResult<Vec<QueuedAction>> {
        let rows: Vec<ActionRow> =
            sqlx::query_as("SELECT * FROM offline_actions ORDER BY enqueued_at ASC, seq ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(QueuedAction::try_from).collect()
    }

    async fn count(&self) -> QueueResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> QueueResult<usize> {
        let result = sqlx::query("DELETE FROM offline_actions")
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    seq: i64,
    id: String,
    request_id: String,
    method: String,
    endpoint: String,
    content_type: Option<String>,
    payload: Option<Vec<u8>>,
    headers: String,
    idempotency_key: Option<String>,
    enqueued_at: String,
    attempt_count: i64,
    max_attempts: i64,
    last_error: Option<String>,
}

impl TryFrom<ActionRow> for QueuedAction {
    type Error = QueueError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let method = HttpMethod::from_str(&row.method)
            .ok_or_else(|| QueueError::Serialization(format!("unknown method: {}", row.method)))?;
        let headers: BTreeMap<String, String> = serde_json::from_str(&row.headers)?;

        Ok(Self {
            id: parse_uuid(&row.id)?,
            request_id: parse_uuid(&row.request_id)?,
            method,
            endpoint: row.endpoint,
            content_type: row.content_type,
            payload: row.payload,
            headers,
            idempotency_key: row.idempotency_key,
            enqueued_at: parse_datetime(&row.enqueued_at)?,
            sequence: row.seq,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or_default(),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(1),
            last_error: row.last_error,
        })
    }
}
