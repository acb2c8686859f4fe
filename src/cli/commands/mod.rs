//! CLI command implementations.

pub mod classify;
pub mod policy;
pub mod queue;
