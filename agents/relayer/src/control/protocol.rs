use std::fmt::Display;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::LengthDelimitedCodec;

use relay_core::{EventType, Pagination, RouteMessage};

/// File name of the control socket inside the socket directory
pub const SOCKET_NAME: &str = "relayer.sock";

/// Upper bound of one frame on the control socket
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Codec framing every envelope on the control socket
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Command carried by an [`Envelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Event {
    /// Persisted height of one or every chain
    GetBlock,
    /// Page of stored messages
    GetMessageList,
    /// Replay a stored message or regenerate one from chain state
    RelayMessage,
    /// Delete a pending message
    MessageRemove,
    /// Revert a message on its source chain
    RevertMessage,
    /// Query a fee
    GetFee,
    /// Set a fee
    SetFee,
    /// Claim the collected fees
    ClaimFee,
    /// Wipe the database
    #[serde(rename = "PruneDB")]
    #[strum(serialize = "PruneDB")]
    PruneDb,
    /// Latest height of a chain
    CurrentHeight,
    /// Failure of a request, server to client only
    Error,
}

/// One frame on the control socket.
///
/// `id` is chosen by the client and echoed by the server, so a client can
/// keep one connection and match every response to its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command
    pub event: Event,
    /// Correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Request or response payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Envelope carrying `payload`
    pub fn new<T: Serialize>(event: Event, id: Option<u64>, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            event,
            id,
            data: serde_json::to_value(payload)?,
        })
    }

    /// `Error` envelope answering request `id`
    pub fn error(id: Option<u64>, message: impl Display) -> Self {
        Self {
            event: Event::Error,
            id,
            data: serde_json::json!({ "message": message.to_string() }),
        }
    }

    /// Decode the payload
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// Request of [`Event::GetBlock`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqGetBlock {
    /// Chain to query, ignored when `all` is set
    #[serde(default)]
    pub chain: String,
    /// Query every chain
    #[serde(default)]
    pub all: bool,
}

/// One entry of the [`Event::GetBlock`] response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResGetBlock {
    /// Chain id
    pub chain: String,
    /// Persisted height
    pub height: u64,
}

/// Request of [`Event::GetMessageList`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqMessageList {
    /// Source chain, every chain if empty
    #[serde(default)]
    pub chain: String,
    /// Window over the stored messages
    #[serde(default)]
    pub pagination: Pagination,
}

/// Response of [`Event::GetMessageList`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResMessageList {
    /// The requested page
    pub messages: Vec<RouteMessage>,
    /// Number of stored messages of the chain
    pub total: usize,
}

/// Request of [`Event::RelayMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqRelayMessage {
    /// Source chain
    pub chain: String,
    /// Sequence number
    pub sn: u64,
    /// Regenerate the message from this source height instead of replaying
    /// the stored copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

/// Request of [`Event::MessageRemove`] and [`Event::RevertMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqMessage {
    /// Source chain
    pub chain: String,
    /// Sequence number
    pub sn: u64,
}

/// Response of [`Event::MessageRemove`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResMessageRemove {
    /// Sequence number
    pub sn: u64,
    /// Source chain
    pub chain: String,
    /// Destination chain
    pub dst: String,
    /// Source height of the message
    pub height: u64,
    /// Event type of the message
    pub event: EventType,
}

/// Response of [`Event::RevertMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResRevertMessage {
    /// Reverted sequence number
    pub sn: u64,
}

/// Request of [`Event::GetFee`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqGetFee {
    /// Chain holding the fee
    pub chain: String,
    /// Network the fee applies to
    pub network: String,
    /// Include the response fee
    #[serde(default)]
    pub response: bool,
}

/// Response of [`Event::GetFee`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResGetFee {
    /// Chain holding the fee
    pub chain: String,
    /// Fee amount
    pub fee: u64,
    /// Whether the response fee is included
    pub response: bool,
}

/// Request of [`Event::SetFee`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqSetFee {
    /// Chain holding the fee
    pub chain: String,
    /// Network the fee applies to
    pub network: String,
    /// Message fee
    pub msg_fee: u64,
    /// Response fee
    pub res_fee: u64,
}

/// Request of [`Event::ClaimFee`] and [`Event::CurrentHeight`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqChain {
    /// Chain id
    pub chain: String,
}

/// Response of [`Event::CurrentHeight`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResCurrentHeight {
    /// Chain id
    pub chain: String,
    /// Latest height reported by the chain
    pub height: u64,
}

/// Status response of the mutating commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResStatus {
    /// `Success` when the command went through
    pub status: String,
}

impl ResStatus {
    /// The success status
    pub fn success() -> Self {
        Self {
            status: "Success".to_owned(),
        }
    }
}

/// Payload of [`Event::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResError {
    /// Human readable failure
    pub message: String,
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_wire_format() {
        let envelope = Envelope::new(
            Event::PruneDb,
            Some(7),
            &json!({}),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"event": "PruneDB", "id": 7, "data": {}})
        );

        let parsed: Envelope =
            serde_json::from_str(r#"{"event": "GetBlock", "data": {"all": true}}"#).unwrap();
        assert_eq!(parsed.id, None);
        let req: ReqGetBlock = parsed.decode().unwrap();
        assert!(req.all);
        assert!(req.chain.is_empty());
    }

    #[test]
    fn error_envelope() {
        let envelope = Envelope::error(Some(3), "chain not configured: x");
        assert_eq!(envelope.event, Event::Error);
        let err: ResError = envelope.decode().unwrap();
        assert_eq!(err.message, "chain not configured: x");
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<Envelope>(r#"{"event": "Reboot", "data": {}}"#).is_err());
    }

    #[test]
    fn relay_request_height_is_optional() {
        let req: ReqRelayMessage = serde_json::from_value(json!({"chain": "mock-1", "sn": 1})).unwrap();
        assert_eq!(req.height, None);
        assert_eq!(
            serde_json::to_value(ReqSetFee {
                chain: "mock-1".into(),
                network: "mock-2".into(),
                msg_fee: 10,
                res_fee: 5
            })
            .unwrap(),
            json!({"chain": "mock-1", "network": "mock-2", "msg_fee": 10, "res_fee": 5})
        );
    }
}
