//! Shared building blocks of the relay agents: persistence on top of rocksdb,
//! settings loading, tracing, metrics and the agent bootstrap.

// Forbid unsafe code outside of tests
#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(missing_docs)]

pub mod settings;

/// Base trait for an agent
mod agent;
pub use agent::*;

mod metrics;
pub use metrics::*;

mod server;
pub use server::*;

/// Relay database utils
pub mod db;
