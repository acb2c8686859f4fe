//! Seaworthy - adaptive network resilience
//!
//! Seaworthy sits between an application and an unreliable network. It
//! classifies the link into a connection tier, derives request behaviour from
//! that tier, and schedules outgoing requests with caching, de-duplication,
//! bounded concurrency and retry. Mutations that cannot be delivered are
//! persisted and replayed in order once connectivity returns.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): monitor, resolver, cache, deduplicator,
//!   scheduler and offline queue
//! - **Adapters** (`adapters`): SQLite and in-memory action stores, reqwest transport
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use seaworthy::{Config, NetworkSignals, ResilienceLayer, ScheduledRequest, TargetDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let transport = std::sync::Arc::new(seaworthy::adapters::http::HttpTransport::new(&config.transport)?);
//!     let store = seaworthy::adapters::open_action_store(&config).await?;
//!     let layer = ResilienceLayer::start(&config, NetworkSignals::online(), transport, store).await?;
//!
//!     let outcome = layer.submit(ScheduledRequest::read(TargetDescriptor::get("/status"))).await?;
//!     println!("{:?}", outcome.payload().map(|p| p.status));
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{QueueError, QueueResult, RequestError};
pub use domain::models::{
    BehaviorConfig, CachePolicy, Config, ConnectionProfile, ConnectionTier, HttpMethod,
    LinkQuality, NetworkSignals, PermanentFailure, PolicyTable, QueuedAction, RequestOutcome,
    RequestPriority, ResponsePayload, ScheduledRequest, TargetDescriptor,
};
pub use domain::ports::{ActionSink, ActionStore, Clock, Transport};
pub use services::{
    AdaptiveConfigResolver, ConnectionMonitor, DrainReport, OfflineActionQueue, RequestScheduler,
    ResilienceLayer, ResponseCache,
};
