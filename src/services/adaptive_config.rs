//! Tier -> behaviour mapping.

use crate::domain::models::{BehaviorConfig, ConnectionTier, PolicyTable};

/// Pure lookup from connection tier to `BehaviorConfig`.
///
/// The table is fixed at construction; `resolve` has no state and no side
/// effects, so every component can call it on every decision.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveConfigResolver {
    table: PolicyTable,
}

impl AdaptiveConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom table, e.g. one loaded from configuration.
    pub const fn with_table(table: PolicyTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self, tier: ConnectionTier) -> BehaviorConfig {
        *self.table.row(tier)
    }

    pub const fn table(&self) -> &PolicyTable {
        &self.table
    }
}
