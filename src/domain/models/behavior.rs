use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connection::ConnectionTier;

/// Behavioural tuning derived from a connection tier.
///
/// Immutable and memoryless: the same tier always yields the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BehaviorConfig {
    /// Upper bound on simultaneously dispatched requests
    pub max_concurrent_requests: usize,

    /// Per-dispatch timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Total dispatch attempts a request may spend
    pub max_retry_attempts: u32,

    /// Base of the exponential backoff in milliseconds
    pub backoff_base_ms: u64,

    /// Ceiling of the exponential backoff in milliseconds
    pub backoff_cap_ms: u64,

    /// Lifetime of cached read responses in milliseconds
    pub cache_ttl_ms: u64,

    /// Whether consumers may prefetch speculatively
    pub enable_speculative_prefetch: bool,
}

impl BehaviorConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Built-in policy row for a tier.
    pub const fn default_for(tier: ConnectionTier) -> Self {
        match tier {
            ConnectionTier::Fast => Self {
                max_concurrent_requests: 6,
                request_timeout_ms: 10_000,
                max_retry_attempts: 3,
                backoff_base_ms: 250,
                backoff_cap_ms: 8_000,
                cache_ttl_ms: 60_000,
                enable_speculative_prefetch: true,
            },
            ConnectionTier::Moderate => Self {
                max_concurrent_requests: 4,
                request_timeout_ms: 15_000,
                max_retry_attempts: 4,
                backoff_base_ms: 500,
                backoff_cap_ms: 15_000,
                cache_ttl_ms: 120_000,
                enable_speculative_prefetch: false,
            },
            ConnectionTier::Slow => Self {
                max_concurrent_requests: 2,
                request_timeout_ms: 30_000,
                max_retry_attempts: 5,
                backoff_base_ms: 1_000,
                backoff_cap_ms: 30_000,
                cache_ttl_ms: 300_000,
                enable_speculative_prefetch: false,
            },
            // Nothing is dispatched while offline; cached reads live longer.
            ConnectionTier::Offline => Self {
                max_concurrent_requests: 1,
                request_timeout_ms: 5_000,
                max_retry_attempts: 1,
                backoff_base_ms: 1_000,
                backoff_cap_ms: 30_000,
                cache_ttl_ms: 900_000,
                enable_speculative_prefetch: false,
            },
        }
    }
}

/// One `BehaviorConfig` row per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyTable {
    #[serde(default = "default_fast")]
    pub fast: BehaviorConfig,

    #[serde(default = "default_moderate")]
    pub moderate: BehaviorConfig,

    #[serde(default = "default_slow")]
    pub slow: BehaviorConfig,

    #[serde(default = "default_offline")]
    pub offline: BehaviorConfig,
}

const fn default_fast() -> BehaviorConfig {
    BehaviorConfig::default_for(ConnectionTier::Fast)
}

const fn default_moderate() -> BehaviorConfig {
    BehaviorConfig::default_for(ConnectionTier::Moderate)
}

const fn default_slow() -> BehaviorConfig {
    BehaviorConfig::default_for(ConnectionTier::Slow)
}

const fn default_offline() -> BehaviorConfig {
    BehaviorConfig::default_for(ConnectionTier::Offline)
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            fast: default_fast(),
            moderate: default_moderate(),
            slow: default_slow(),
            offline: default_offline(),
        }
    }
}

impl PolicyTable {
    pub const fn row(&self, tier: ConnectionTier) -> &BehaviorConfig {
        match tier {
            ConnectionTier::Fast => &self.fast,
            ConnectionTier::Moderate => &self.moderate,
            ConnectionTier::Slow => &self.slow,
            ConnectionTier::Offline => &self.offline,
        }
    }

    /// Check every row; returns the first offending tier and reason.
    pub fn validate(&self) -> Result<(), (ConnectionTier, String)> {
        for tier in ConnectionTier::ALL {
            let row = self.row(tier);
            if row.max_concurrent_requests == 0 {
                return Err((tier, "max_concurrent_requests must be at least 1".to_string()));
            }
            if row.max_retry_attempts == 0 {
                return Err((tier, "max_retry_attempts must be at least 1".to_string()));
            }
            if row.request_timeout_ms == 0 {
                return Err((tier, "request_timeout_ms must be positive".to_string()));
            }
            if row.backoff_base_ms > row.backoff_cap_ms {
                return Err((
                    tier,
                    format!(
                        "backoff_base_ms ({}) must not exceed backoff_cap_ms ({})",
                        row.backoff_base_ms, row.backoff_cap_ms
                    ),
                ));
            }
        }
        Ok(())
    }
}
