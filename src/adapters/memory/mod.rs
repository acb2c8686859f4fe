//! In-process adapters. Nothing here survives a restart.

pub mod action_store;

pub use action_store::InMemoryActionStore;
