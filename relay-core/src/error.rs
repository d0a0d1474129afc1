use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use crate::MessageKey;

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// An "Any"-typed error.
pub trait RelayCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> RelayCustomError for E {}

/// Thin wrapper around a boxed RelayCustomError; required to satisfy
/// AsDynError implementations. Basically a trait-object adaptor.
#[repr(transparent)]
pub struct RelayCustomErrorWrapper(Box<dyn RelayCustomError>);

impl Debug for RelayCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn RelayCustomError>::as_ref(&self))
    }
}

impl Display for RelayCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn RelayCustomError>::as_ref(&self))
    }
}

impl StdError for RelayCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn RelayCustomError> for RelayCustomErrorWrapper {
    fn as_ref(&self) -> &dyn RelayCustomError {
        self.0.as_ref()
    }
}

impl Deref for RelayCustomErrorWrapper {
    type Target = Box<dyn RelayCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// ChainCommunicationError contains errors returned when attempting to
/// call a chain or dispatch a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(RelayCustomErrorWrapper),
    /// A free-form error reported by a chain backend
    #[error("{0}")]
    CustomError(String),
    /// Failed to (de)serialize a chain payload
    #[error(transparent)]
    JsonParseError(#[from] serde_json::Error),
    /// The transaction was rejected at submission time
    #[error("Transaction submission failed ({kind}): {message}")]
    Submission {
        /// Classified kind of the rejection
        kind: SubmissionErrorKind,
        /// Raw error message from the chain
        message: String,
    },
    /// The listener was asked to start from a height the chain cannot serve
    #[error("Invalid start height {start} (latest {latest})")]
    InvalidStartHeight {
        /// Requested start height
        start: u64,
        /// Latest height reported by the chain
        latest: u64,
    },
    /// The completion handle of a delivery was dropped without an outcome
    #[error("Delivery callback for {0} was dropped without completing")]
    CallbackDropped(MessageKey),
    /// A chain request timed out
    #[error("Request timed out")]
    Timeout,
    /// The operation was cancelled before it could finish
    #[error("Operation cancelled")]
    Cancelled,
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: RelayCustomError>(err: E) -> Self {
        Self::Other(RelayCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the other error variant from a static string
    pub fn from_other_str(err: &'static str) -> Self {
        #[derive(Debug)]
        #[repr(transparent)]
        struct StringError(&'static str);
        impl Display for StringError {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.0)
            }
        }
        impl StdError for StringError {}

        Self::from_other(StringError(err))
    }

    /// Classify a raw submission error message returned by a chain node.
    pub fn from_submission(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Submission {
            kind: SubmissionErrorKind::classify(&message),
            message,
        }
    }

    /// Whether this error means the locally tracked nonce is out of sync with
    /// the chain.
    pub fn is_nonce_error(&self) -> bool {
        matches!(self, Self::Submission { kind, .. } if kind.is_nonce_error())
    }
}

/// Known classes of transaction submission errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SubmissionErrorKind {
    /// Gas price below the node's minimum
    Underpriced,
    /// Max fee per gas lower than the block base fee
    BaseFeeTooLow,
    /// Nonce already used
    NonceTooLow,
    /// Nonce ahead of the account's next nonce
    NonceTooHigh,
    /// Anything else
    Other,
}

const ERR_UNDERPRICED: &str = "transaction underpriced";
const ERR_BASE_FEE_TOO_LOW: &str = "max fee per gas less than block base fee";
const ERR_NONCE_TOO_LOW: &str = "nonce too low";
const ERR_NONCE_TOO_HIGH: &str = "nonce too high";

impl SubmissionErrorKind {
    /// Classify by matching known substrings of the node's error message.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains(ERR_NONCE_TOO_LOW) {
            Self::NonceTooLow
        } else if message.contains(ERR_NONCE_TOO_HIGH) {
            Self::NonceTooHigh
        } else if message.contains(ERR_UNDERPRICED) {
            Self::Underpriced
        } else if message.contains(ERR_BASE_FEE_TOO_LOW) {
            Self::BaseFeeTooLow
        } else {
            Self::Other
        }
    }

    /// Nonce-class errors require a resync before the next submission.
    pub fn is_nonce_error(&self) -> bool {
        matches!(self, Self::NonceTooLow | Self::NonceTooHigh)
    }
}
