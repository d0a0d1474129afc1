//! Relay orchestration: per-chain runtimes, the pending message caches, the
//! listener / block processing / dispatch tasks and the control plane.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod chain;
/// Operator control socket: wire protocol, server and client
pub mod control;
mod error;
mod relayer;
mod runtime;
/// Relayer configuration
pub mod settings;

pub use cache::MessageCache;
pub use chain::{Chain, Chains};
pub use error::RelayerError;
pub use relayer::*;
pub use runtime::{ChainRuntime, RuntimeState, INBOUND_QUEUE_CAPACITY};
