//! This crate contains the core primitives of the relay: the message model,
//! the `ChainProvider` contract every chain backend implements, and the error
//! and retry types shared by all crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use error::*;
pub use nonce::*;
pub use retry::{retry, RetryPolicy};
pub use traits::*;
pub use types::*;

mod error;
mod nonce;
/// RPC retry helper and its constants
pub mod retry;
mod traits;
mod types;
