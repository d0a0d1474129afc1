//! In-process chain backend.
//!
//! Produces blocks on a timer, optionally carrying scripted or generated
//! messages, and tracks deliveries in memory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod provider;

pub use provider::{MockChainConf, MockProvider, ScriptedMessage};
