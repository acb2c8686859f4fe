pub mod adaptive_config;
pub mod backoff;
pub mod connection_monitor;
pub mod offline_queue;
pub mod request_deduplicator;
pub mod request_scheduler;
pub mod resilience_layer;
pub mod response_cache;

pub use adaptive_config::AdaptiveConfigResolver;
pub use backoff::{backoff_delay, FixedJitter, JitterSource, RandomJitter};
pub use connection_monitor::{ConnectionMonitor, Subscription, TierChange};
pub use offline_queue::{DrainReport, OfflineActionQueue};
pub use request_deduplicator::RequestDeduplicator;
pub use request_scheduler::{RequestScheduler, SchedulerBuilder, SchedulerStats};
pub use resilience_layer::ResilienceLayer;
pub use response_cache::{CacheEntry, ResponseCache};
