//! The control socket lets an operator query heights and pending messages,
//! replay, remove or revert messages, manage fees and prune the database.
//!
//! Every frame is a length-delimited JSON [`protocol::Envelope`]. Requests on
//! one connection are answered in order.

pub use client::ControlClient;
pub use server::ControlServer;

mod client;
/// Envelope and payload types
pub mod protocol;
mod server;

use crate::RelayerError;

use protocol::Event;

/// Errors of the control socket
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Socket I/O failed
    #[error("control socket i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A payload could not be encoded or decoded
    #[error("malformed control payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The peer closed the connection
    #[error("control connection closed")]
    Closed,
    /// The relayer answered with an `Error` envelope
    #[error("relayer error: {0}")]
    Remote(String),
    /// The response does not belong to the request
    #[error("expected a {expected} response with id {id}, got {event} with id {got:?}")]
    UnexpectedResponse {
        /// Event of the request
        expected: Event,
        /// Id of the request
        id: u64,
        /// Event of the response
        event: Event,
        /// Id of the response
        got: Option<u64>,
    },
    /// The event cannot be sent as a request
    #[error("{0} is not a request")]
    NotARequest(Event),
    /// Handling the request failed on the relayer
    #[error(transparent)]
    Relayer(#[from] RelayerError),
}
