pub mod behavior;
pub mod config;
pub mod connection;
pub mod queued_action;
pub mod request;

pub use behavior::{BehaviorConfig, PolicyTable};
pub use config::{
    CacheConfig, Config, DatabaseConfig, LoggingConfig, OfflineQueueConfig, StoreBackend,
    TransportConfig,
};
pub use connection::{
    classify, ConnectionProfile, ConnectionTier, EffectiveType, LinkQuality, NetworkSignals,
};
pub use queued_action::{PermanentFailure, QueuedAction};
pub use request::{
    CachePolicy, HttpMethod, RequestOutcome, RequestPriority, ResponsePayload, ScheduledRequest,
    TargetDescriptor, IDEMPOTENCY_KEY_HEADER,
};
