use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::MessageKey;

/// Outcome code of a delivery transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseCode {
    /// The transaction failed or reverted
    #[default]
    Failure,
    /// The transaction was included and executed
    Success,
}

/// Outcome of a submitted delivery transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxResponse {
    /// Destination chain height the transaction landed at
    pub height: u64,
    /// Transaction hash
    pub tx_hash: String,
    /// Chain specific error namespace
    #[serde(default)]
    pub codespace: String,
    /// Success or failure
    pub code: ResponseCode,
    /// Raw response data, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl TxResponse {
    /// A successful response
    pub fn success(height: u64, tx_hash: impl Into<String>) -> Self {
        Self {
            height,
            tx_hash: tx_hash.into(),
            code: ResponseCode::Success,
            ..Default::default()
        }
    }

    /// A failed response
    pub fn failure(height: u64, tx_hash: impl Into<String>) -> Self {
        Self {
            height,
            tx_hash: tx_hash.into(),
            code: ResponseCode::Failure,
            ..Default::default()
        }
    }

    /// Whether the transaction executed successfully
    pub fn is_success(&self) -> bool {
        self.code == ResponseCode::Success
    }
}

/// Receipt of a transaction as seen by the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Receipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Height the transaction was included at
    pub height: u64,
    /// Execution status
    pub status: bool,
}

/// A delivered message waiting for destination finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct TransactionObject {
    /// Identity of the delivered message
    #[serde(flatten)]
    pub key: MessageKey,
    /// Destination chain
    pub dst: String,
    /// Source height of the message, used to regenerate it
    pub message_height: u64,
    /// Delivery transaction hash
    pub tx_hash: String,
    /// Destination height of the delivery transaction
    pub tx_height: u64,
}
