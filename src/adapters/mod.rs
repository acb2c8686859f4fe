//! Infrastructure adapters for external systems.

pub mod http;
pub mod memory;
pub mod sqlite;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::domain::models::{Config, StoreBackend};
use crate::domain::ports::ActionStore;

/// Open the offline action store selected in configuration.
///
/// A SQLite store that cannot be opened or migrated is an error; there is no
/// silent fallback to memory.
pub async fn open_action_store(config: &Config) -> Result<Arc<dyn ActionStore>> {
    match config.offline_queue.backend {
        StoreBackend::Sqlite => {
            let pool = sqlite::initialize_from_config(&config.database)
                .await
                .with_context(|| format!("Failed to open offline queue database at {}", config.database.path))?;
            Ok(Arc::new(sqlite::SqliteActionStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("offline queue uses the in-memory store; queued actions will not survive a restart");
            Ok(Arc::new(memory::InMemoryActionStore::new()))
        }
    }
}
