use relay_base::db::DbError;
use relay_core::{ChainCommunicationError, MessageKey};

/// Errors of the relay orchestration and its control operations
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    /// No runtime exists for the chain id
    #[error("chain not configured: {0}")]
    ChainNotConfigured(String),
    /// A source reused a sequence number for another destination while the
    /// first message is still pending
    #[error("sequence number {sn} of {src} is already pending for {pending_dst}, refusing {dst}")]
    SequenceReuse {
        /// Source chain
        src: String,
        /// Reused sequence number
        sn: u64,
        /// Destination of the pending message
        pending_dst: String,
        /// Destination of the rejected message
        dst: String,
    },
    /// Regenerating messages at a height did not yield the requested one
    #[error("message {key} not found at height {height}")]
    MessageNotFound {
        /// Requested message
        key: MessageKey,
        /// Height that was scanned
        height: u64,
    },
    /// The listener of a chain stopped with an error
    #[error("listener of {chain} failed")]
    Listener {
        /// Chain of the listener
        chain: String,
        /// Error returned by the provider
        #[source]
        source: ChainCommunicationError,
    },
    /// A provider call failed
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),
    /// A store operation failed
    #[error(transparent)]
    Db(#[from] DbError),
}
