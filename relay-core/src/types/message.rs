use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Base delay between delivery attempts of the same message.
pub const RETRY_INTERVAL_SECS: i64 = 5;
/// Highest exponent applied to [`RETRY_INTERVAL_SECS`].
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Tag describing which contract event produced a message
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventType {
    /// Message emitted by the source connection contract
    #[default]
    EmitMessage,
    /// Call message towards a destination dapp
    CallMessage,
    /// Rollback of a previously sent message
    #[serde(rename = "rollBackMessage")]
    #[strum(serialize = "rollBackMessage")]
    RollbackMessage,
    /// Operator initiated revert
    RevertMessage,
    /// Admin rotation
    SetAdmin,
    /// Fee query
    GetFee,
    /// Fee update
    SetFee,
    /// Fee withdrawal
    ClaimFee,
    /// Execution of a rollback on the source chain
    ExecuteRollback,
}

/// Identity of a relay obligation: `(source chain, sequence number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, new)]
pub struct MessageKey {
    /// Source chain id
    pub src: String,
    /// Sequence number assigned by the source chain
    pub sn: u64,
}

impl Display for MessageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.src, self.sn)
    }
}

/// A message key pinned to the source height it was emitted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct MessageKeyAtHeight {
    /// Message identity
    #[serde(flatten)]
    pub key: MessageKey,
    /// Source chain height
    pub height: u64,
}

/// A cross-chain message discovered on a source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Destination chain id
    pub dst: String,
    /// Source chain id
    pub src: String,
    /// Sequence number
    pub sn: u64,
    /// Opaque payload
    #[serde(default)]
    pub data: Vec<u8>,
    /// Source height the message was observed at
    #[serde(rename = "messageHeight")]
    pub message_height: u64,
    /// Event that produced the message
    #[serde(rename = "eventType", default)]
    pub event_type: EventType,
    /// Request id, only set by some event types
    #[serde(rename = "reqID", default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<u64>,
}

impl Message {
    /// Identity of this message
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.src.clone(), self.sn)
    }
}

/// A [`Message`] together with the relay-local delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMessage {
    /// The wrapped message
    #[serde(flatten)]
    pub message: Message,
    /// Number of failed delivery attempts
    #[serde(default)]
    pub retry: u32,
    /// Set while a delivery is outstanding
    #[serde(default)]
    pub processing: bool,
    /// Earliest time of the next attempt, once an attempt has failed
    #[serde(rename = "lastTry", default, skip_serializing_if = "Option::is_none")]
    pub last_try: Option<DateTime<Utc>>,
}

impl From<Message> for RouteMessage {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

impl RouteMessage {
    /// Wrap a freshly discovered message
    pub fn new(message: Message) -> Self {
        Self {
            message,
            retry: 0,
            processing: false,
            last_try: None,
        }
    }

    /// Identity of the wrapped message
    pub fn key(&self) -> MessageKey {
        self.message.key()
    }

    /// True while a delivery is outstanding or the retry backoff has not yet
    /// passed.
    pub fn is_processing(&self, now: DateTime<Utc>) -> bool {
        self.processing || self.last_try.is_some_and(|t| t > now)
    }

    /// Mark a delivery as outstanding
    pub fn set_processing(&mut self) {
        self.processing = true;
    }

    /// Account for a failed attempt: clears the processing flag, bumps the
    /// retry counter and pushes the next attempt out exponentially.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.processing = false;
        self.retry = self.retry.saturating_add(1);
        let exponent = (self.retry - 1).min(MAX_BACKOFF_EXPONENT);
        let backoff = Duration::seconds(RETRY_INTERVAL_SECS * 2i64.pow(exponent));
        self.last_try = Some(now + backoff);
    }

    /// Forget every previous attempt, e.g. when an operator replays the message
    pub fn reset_attempts(&mut self) {
        self.retry = 0;
        self.processing = false;
        self.last_try = None;
    }

    /// Whether the retry budget is used up
    pub fn retries_exhausted(&self, max_retries: u32) -> bool {
        self.retry >= max_retries
    }

    /// Whether the last attempt is older than `duration`. Messages that were
    /// never attempted never elapse.
    pub fn is_elapsed(&self, duration: Duration, now: DateTime<Utc>) -> bool {
        self.last_try.is_some_and(|t| t + duration < now)
    }
}

/// Everything a provider saw in one block/checkpoint/ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default, new)]
pub struct BlockInfo {
    /// Height of the block
    pub height: u64,
    /// Messages found in it
    pub messages: Vec<Message>,
}
