use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    BlockInfo, ChainResult, Message, MessageKey, MessageKeyAtHeight, Receipt, RouteCallback,
};

/// Capabilities every ledger specific backend implements. The relay core only
/// talks to chains through this trait.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait ChainProvider: Send + Sync + Debug {
    /// Stable identifier of the chain, e.g. `0x2.icon`
    fn chain_id(&self) -> &str;

    /// Backend type tag the provider was built from, e.g. `evm`
    fn chain_type(&self) -> &str;

    /// One-time setup (key material, client connections)
    async fn init(&self) -> ChainResult<()>;

    /// Latest height of the chain
    async fn query_latest_height(&self) -> ChainResult<u64>;

    /// Blocks behind head an observation needs before it is irreversible.
    /// Zero for ledgers with instant finality.
    fn finality_depth(&self) -> u64;

    /// Scan the chain from `start_height` forward, pushing one [`BlockInfo`]
    /// per processed block into `outbound` in non-decreasing height order.
    ///
    /// Returns `Ok(())` once `cancel` fires. Transient I/O errors are retried
    /// internally; an error is only returned for unrecoverable conditions such
    /// as an invalid start height.
    async fn listen(
        &self,
        cancel: CancellationToken,
        start_height: u64,
        outbound: mpsc::Sender<BlockInfo>,
    ) -> ChainResult<()>;

    /// Source side eligibility of a message
    async fn should_send_message(&self, message: &Message) -> ChainResult<bool>;

    /// Destination side eligibility of a message
    async fn should_receive_message(&self, message: &Message) -> ChainResult<bool>;

    /// Submit the delivery transaction for `message`.
    ///
    /// Returns once the transaction is submitted. `callback` receives the final
    /// outcome after confirmation, from whatever task the provider chooses.
    async fn route(&self, message: &Message, callback: RouteCallback) -> ChainResult<()>;

    /// Whether the destination chain already executed the message
    async fn message_received(&self, key: &MessageKey) -> ChainResult<bool>;

    /// Rebuild the messages found at a historical height
    async fn generate_messages(&self, key: &MessageKeyAtHeight) -> ChainResult<Vec<Message>>;

    /// Receipt of a previously submitted transaction
    async fn query_transaction_receipt(&self, tx_hash: &str) -> ChainResult<Receipt>;

    /// Revert the message with sequence number `sn` on this chain
    async fn revert_message(&self, sn: u64) -> ChainResult<()>;

    /// Fee charged for messages towards `network`
    async fn get_fee(&self, network: &str, response_fee: bool) -> ChainResult<u64>;

    /// Update the fees charged for messages towards `network`
    async fn set_fee(&self, network: &str, msg_fee: u64, res_fee: u64) -> ChainResult<()>;

    /// Withdraw the accumulated fees
    async fn claim_fee(&self) -> ChainResult<()>;
}
