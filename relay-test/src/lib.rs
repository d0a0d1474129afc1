//! Test doubles for the relay crates.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

/// Mock implementations of the chain contract
pub mod mocks;
