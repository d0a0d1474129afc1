use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, warn};

use relay_core::{BlockInfo, ChainProvider, Message, MessageKey, RouteMessage};

use crate::{Chain, MessageCache};

/// Capacity of every chain's inbound block queue
pub const INBOUND_QUEUE_CAPACITY: usize = 5000;

/// Lock-protected part of a [`ChainRuntime`]
#[derive(Debug, Default)]
pub struct RuntimeState {
    /// Messages waiting for delivery to this chain
    pub cache: MessageCache,
    /// Highest height handed over by the listener
    pub last_observed_height: u64,
    /// Highest height written to the block store
    pub last_persisted_height: u64,
}

/// Per-chain mutable state of the relay.
///
/// The cache holds messages whose *destination* is this chain. The height
/// fields track this chain as a source.
#[derive(Debug)]
pub struct ChainRuntime {
    chain: Chain,
    inbound_tx: mpsc::Sender<BlockInfo>,
    inbound_rx: SyncMutex<Option<mpsc::Receiver<BlockInfo>>>,
    state: Mutex<RuntimeState>,
}

impl ChainRuntime {
    /// Runtime of `chain`, resuming after `persisted_height`
    pub fn new(chain: Chain, persisted_height: u64) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        Self {
            chain,
            inbound_tx,
            inbound_rx: SyncMutex::new(Some(inbound_rx)),
            state: Mutex::new(RuntimeState {
                last_persisted_height: persisted_height,
                ..Default::default()
            }),
        }
    }

    /// The chain this runtime belongs to
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Id of the chain
    pub fn chain_id(&self) -> &str {
        &self.chain.chain_id
    }

    /// Provider of the chain
    pub fn provider(&self) -> &Arc<dyn ChainProvider> {
        &self.chain.provider
    }

    /// Producer side of the inbound block queue
    pub fn inbound_sender(&self) -> mpsc::Sender<BlockInfo> {
        self.inbound_tx.clone()
    }

    /// Consumer side of the inbound block queue. Only the first call gets it.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<BlockInfo>> {
        self.inbound_rx.lock().take()
    }

    /// Lock the mutable state. Never hold the guard across provider calls.
    pub async fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().await
    }

    /// Height the listener starts from: the configured start height or the
    /// persisted height, whichever is higher.
    pub async fn start_height(&self) -> u64 {
        let persisted = self.state.lock().await.last_persisted_height;
        self.chain.start_height.max(persisted)
    }

    /// Upsert each message as a fresh [`RouteMessage`].
    ///
    /// When the cached entry of a key is in flight, only its message body is
    /// replaced and the delivery state is kept.
    pub async fn merge_messages(&self, messages: Vec<Message>) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        for message in messages {
            let key = message.key();
            match state.cache.get_mut(&key) {
                Some(existing) if existing.is_processing(now) => {
                    debug!(chain = self.chain_id(), %key, "Message in flight, keeping delivery state");
                    existing.message = message;
                    continue;
                }
                _ => {}
            }
            state.cache.add(RouteMessage::new(message));
        }
    }

    /// Remove `keys` from the cache; absent keys are ignored
    pub async fn clear_messages(&self, keys: &[MessageKey]) {
        let mut state = self.state.lock().await;
        for key in keys {
            state.cache.remove(key);
        }
    }

    /// Snapshot of the cached entry of `key`
    pub async fn cached_message(&self, key: &MessageKey) -> Option<RouteMessage> {
        self.state.lock().await.cache.get(key).cloned()
    }

    /// Number of cached messages
    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Delivery gate, called on the destination runtime.
    ///
    /// True iff `message` exists, is not in flight, this chain is willing to
    /// receive it and `src` is willing to send it. A provider error counts as
    /// a refusal.
    pub async fn should_send_message(
        &self,
        message: Option<&RouteMessage>,
        src: &ChainRuntime,
    ) -> bool {
        let Some(route_message) = message else {
            return false;
        };
        if route_message.is_processing(Utc::now()) {
            return false;
        }
        let message = &route_message.message;

        match self.provider().should_receive_message(message).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                warn!(?err, chain = self.chain_id(), key = %message.key(), "should_receive_message failed");
                return false;
            }
        }
        match src.provider().should_send_message(message).await {
            Ok(should_send) => should_send,
            Err(err) => {
                warn!(?err, chain = src.chain_id(), key = %message.key(), "should_send_message failed");
                false
            }
        }
    }
}
