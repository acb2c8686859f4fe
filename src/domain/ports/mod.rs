//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these to plug the resilience layer into a host:
//! - Transport: the request/response channel to the backend
//! - ActionStore: durable storage for deferred mutations
//! - ActionSink: where the scheduler hands off durable requests
//! - Clock: time source for cache expiry

pub mod action_store;
pub mod clock;
pub mod transport;

pub use action_store::{ActionSink, ActionStore};
pub use clock::{Clock, ManualClock, TokioClock};
pub use transport::Transport;
