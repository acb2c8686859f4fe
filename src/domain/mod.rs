//! Domain layer for the resilience layer
//!
//! Connection, request and offline-action models plus the port traits
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{QueueError, QueueResult, RequestError};
