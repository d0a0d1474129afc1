use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use relay_core::{
    BlockInfo, ChainCommunicationError, ChainProvider, ChainResult, EventType, Message, MessageKey,
    MessageKeyAtHeight, NonceManager, Receipt, RetryPolicy, RouteCallback, TxResponse,
};
use relay_core::retry::{RETRY_POWER, RPC_MAX_RETRY_ATTEMPTS};

const CHAIN_TYPE: &str = "mock";

fn default_block_duration_ms() -> u64 {
    1000
}

/// Parameters of a mock chain
#[derive(Debug, Clone, Deserialize)]
pub struct MockChainConf {
    /// Time between two produced blocks
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,
    /// Reported finality depth
    #[serde(default)]
    pub finality_block: u64,
    /// Head of the chain before the listener produces its first block. A
    /// listener may start at most one block above it.
    #[serde(default)]
    pub initial_height: u64,
    /// When set, every block carries one generated message towards these
    /// chains, round robin
    #[serde(default)]
    pub target_chains: Vec<String>,
    /// Scripted messages, emitted in the block matching their height
    #[serde(default)]
    pub messages: Vec<ScriptedMessage>,
    /// Number of deliveries that report a failed transaction before
    /// deliveries start succeeding
    #[serde(default)]
    pub failing_routes: u32,
    /// Delay between submission and the delivery callback
    #[serde(default)]
    pub confirmation_delay_ms: u64,
    /// Number of block fetches that time out before fetches start
    /// succeeding
    #[serde(default)]
    pub failing_block_fetches: u32,
}

/// A message the mock chain emits at a fixed height
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedMessage {
    /// Destination chain
    pub dst: String,
    /// Sequence number
    pub sn: u64,
    /// Height of the block carrying the message
    pub height: u64,
    /// Payload
    #[serde(default)]
    pub data: String,
}

impl ScriptedMessage {
    fn to_message(&self, src: &str) -> Message {
        Message {
            dst: self.dst.clone(),
            src: src.to_owned(),
            sn: self.sn,
            data: self.data.clone().into_bytes(),
            message_height: self.height,
            event_type: EventType::EmitMessage,
            req_id: None,
        }
    }
}

impl Default for MockChainConf {
    fn default() -> Self {
        Self {
            block_duration_ms: default_block_duration_ms(),
            finality_block: 0,
            initial_height: 0,
            target_chains: vec![],
            messages: vec![],
            failing_routes: 0,
            confirmation_delay_ms: 0,
            failing_block_fetches: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    head: u64,
    account_nonce: u64,
    next_sn: u64,
    emitted: BTreeMap<u64, Vec<Message>>,
    received: HashSet<MessageKey>,
    receipts: HashMap<String, Receipt>,
    fees: HashMap<String, (u64, u64)>,
    reverted: Vec<u64>,
    failures_left: u32,
    fetch_failures_left: u32,
    route_calls: u32,
    claims: u32,
}

/// An in-process chain producing blocks on a timer.
///
/// Deliveries towards it are tracked in memory, so a pair of mock chains is
/// enough to drive the relay end to end.
#[derive(Debug)]
pub struct MockProvider {
    chain_id: String,
    conf: MockChainConf,
    scripted: Vec<Message>,
    state: Mutex<MockState>,
    nonce: NonceManager,
}

impl MockProvider {
    /// A mock chain named `chain_id`
    pub fn new(chain_id: String, conf: MockChainConf) -> Self {
        let next_sn = conf.messages.iter().map(|m| m.sn).max().unwrap_or(0) + 1;
        let state = MockState {
            head: conf.initial_height,
            next_sn,
            failures_left: conf.failing_routes,
            fetch_failures_left: conf.failing_block_fetches,
            ..Default::default()
        };
        let scripted = conf
            .messages
            .iter()
            .map(|m| m.to_message(&chain_id))
            .collect();
        Self {
            chain_id,
            conf,
            scripted,
            state: Mutex::new(state),
            nonce: NonceManager::new(),
        }
    }

    fn scripted_at(&self, height: u64) -> Vec<Message> {
        self.scripted
            .iter()
            .filter(|m| m.message_height == height)
            .cloned()
            .collect()
    }

    /// Keys of every message delivered to this chain
    pub fn delivered(&self) -> Vec<MessageKey> {
        let mut keys: Vec<_> = self.state.lock().received.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of delivery transactions submitted to this chain
    pub fn route_calls(&self) -> u32 {
        self.state.lock().route_calls
    }

    /// Sequence numbers reverted on this chain
    pub fn reverted(&self) -> Vec<u64> {
        self.state.lock().reverted.clone()
    }

    /// Number of fee claims
    pub fn claims(&self) -> u32 {
        self.state.lock().claims
    }

    /// Move the head forward without producing blocks
    pub fn advance_head(&self, height: u64) {
        let mut state = self.state.lock();
        state.head = state.head.max(height);
    }

    /// Overwrite the execution status of a delivered transaction and forget
    /// the delivery, as a reorg would.
    pub fn revert_receipt(&self, tx_hash: &str) {
        let mut state = self.state.lock();
        if let Some(receipt) = state.receipts.get_mut(tx_hash) {
            receipt.status = false;
        }
        state.received.clear();
    }

    fn fetch_block(&self, height: u64) -> ChainResult<BlockInfo> {
        {
            let mut state = self.state.lock();
            if state.fetch_failures_left > 0 {
                state.fetch_failures_left -= 1;
                return Err(ChainCommunicationError::Timeout);
            }
        }
        Ok(self.produce_block(height))
    }

    fn produce_block(&self, height: u64) -> BlockInfo {
        let mut state = self.state.lock();
        state.head = state.head.max(height);

        let mut messages = self.scripted_at(height);
        if !self.conf.target_chains.is_empty() {
            let sn = state.next_sn;
            state.next_sn += 1;
            let dst = &self.conf.target_chains[(sn as usize) % self.conf.target_chains.len()];
            messages.push(Message {
                dst: dst.clone(),
                src: self.chain_id.clone(),
                sn,
                data: format!("message from {}", self.chain_id).into_bytes(),
                message_height: height,
                event_type: EventType::EmitMessage,
                req_id: None,
            });
        }
        if !messages.is_empty() {
            state.emitted.insert(height, messages.clone());
        }
        BlockInfo::new(height, messages)
    }

    fn submit_tx(&self, message: &Message, nonce: u64) -> ChainResult<TxResponse> {
        let mut state = self.state.lock();
        state.route_calls += 1;
        state.account_nonce = nonce + 1;
        let height = state.head;
        let tx_hash = format!("{}-tx-{nonce}", self.chain_id);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            debug!(%tx_hash, sn = message.sn, "Mock delivery reverted");
            return Ok(TxResponse::failure(height, tx_hash));
        }
        state.received.insert(message.key());
        state
            .receipts
            .insert(tx_hash.clone(), Receipt::new(tx_hash.clone(), height, true));
        Ok(TxResponse::success(height, tx_hash))
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn chain_type(&self) -> &str {
        CHAIN_TYPE
    }

    async fn init(&self) -> ChainResult<()> {
        debug!(chain = %self.chain_id, "Mock chain initialized");
        Ok(())
    }

    async fn query_latest_height(&self) -> ChainResult<u64> {
        Ok(self.state.lock().head)
    }

    fn finality_depth(&self) -> u64 {
        self.conf.finality_block
    }

    #[instrument(skip_all, fields(chain = %self.chain_id, start_height))]
    async fn listen(
        &self,
        cancel: CancellationToken,
        start_height: u64,
        outbound: mpsc::Sender<BlockInfo>,
    ) -> ChainResult<()> {
        let latest = self.state.lock().head;
        if start_height > latest.saturating_add(1) {
            return Err(ChainCommunicationError::InvalidStartHeight {
                start: start_height,
                latest,
            });
        }
        info!(latest, "Listening to mock chain");
        let period = Duration::from_millis(self.conf.block_duration_ms.max(1));
        let policy = RetryPolicy::new(RPC_MAX_RETRY_ATTEMPTS, period, period * 10, RETRY_POWER);
        let mut ticker = tokio::time::interval(period);
        let mut height = start_height;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let block = match policy
                .retry(&cancel, || std::future::ready(self.fetch_block(height)))
                .await
            {
                Ok(block) => block,
                Err(ChainCommunicationError::Cancelled) => break,
                Err(err) => return Err(err),
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = outbound.send(block) => {
                    if sent.is_err() {
                        warn!("Block receiver dropped, stopping listener");
                        break;
                    }
                }
            }
            height += 1;
        }
        info!(height, "Mock listener stopped");
        Ok(())
    }

    async fn should_send_message(&self, message: &Message) -> ChainResult<bool> {
        Ok(!self.state.lock().reverted.contains(&message.sn))
    }

    async fn should_receive_message(&self, message: &Message) -> ChainResult<bool> {
        Ok(!self.state.lock().received.contains(&message.key()))
    }

    async fn route(&self, message: &Message, callback: RouteCallback) -> ChainResult<()> {
        let response = self
            .nonce
            .submit(
                || async { Ok(self.state.lock().account_nonce) },
                |nonce| async move { self.submit_tx(message, nonce) },
            )
            .await?;
        info!(chain = %self.chain_id, key = %message.key(), tx_hash = %response.tx_hash, "Submitted mock delivery");

        let delay = Duration::from_millis(self.conf.confirmation_delay_ms);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            callback.complete(Ok(response));
        });
        Ok(())
    }

    async fn message_received(&self, key: &MessageKey) -> ChainResult<bool> {
        Ok(self.state.lock().received.contains(key))
    }

    async fn generate_messages(&self, key: &MessageKeyAtHeight) -> ChainResult<Vec<Message>> {
        let state = self.state.lock();
        if let Some(messages) = state.emitted.get(&key.height) {
            return Ok(messages.clone());
        }
        Ok(self.scripted_at(key.height))
    }

    async fn query_transaction_receipt(&self, tx_hash: &str) -> ChainResult<Receipt> {
        self.state
            .lock()
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| {
                ChainCommunicationError::CustomError(format!("receipt for {tx_hash} not found"))
            })
    }

    async fn revert_message(&self, sn: u64) -> ChainResult<()> {
        info!(chain = %self.chain_id, sn, "Reverting message");
        self.state.lock().reverted.push(sn);
        Ok(())
    }

    async fn get_fee(&self, network: &str, response_fee: bool) -> ChainResult<u64> {
        let fees = self.state.lock().fees.get(network).copied();
        match fees {
            Some((msg_fee, res_fee)) if response_fee => {
                msg_fee.checked_add(res_fee).ok_or_else(|| {
                    ChainCommunicationError::CustomError(format!(
                        "fee towards {network} overflows: {msg_fee} + {res_fee}"
                    ))
                })
            }
            Some((msg_fee, _)) => Ok(msg_fee),
            None => Ok(0),
        }
    }

    async fn set_fee(&self, network: &str, msg_fee: u64, res_fee: u64) -> ChainResult<()> {
        self.state
            .lock()
            .fees
            .insert(network.to_owned(), (msg_fee, res_fee));
        Ok(())
    }

    async fn claim_fee(&self) -> ChainResult<()> {
        self.state.lock().claims += 1;
        Ok(())
    }
}
