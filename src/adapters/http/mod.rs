//! HTTP transport over reqwest.

pub mod transport;

pub use transport::HttpTransport;
