use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use relay_base::db::DbError;
use relay_core::{BlockInfo, Message, RouteMessage};

use crate::{ChainRuntime, RelayContext, RelayerError};

impl RelayContext {
    /// Drain the inbound queue of `runtime` until cancelled.
    pub(crate) async fn run_block_processor(
        self: Arc<Self>,
        runtime: Arc<ChainRuntime>,
        mut inbound: mpsc::Receiver<BlockInfo>,
        cancel: CancellationToken,
    ) {
        loop {
            let block = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                block = inbound.recv() => block,
            };
            let Some(block) = block else {
                break;
            };
            self.process_block(&runtime, block).await;
        }
        info!("Block processor stopped");
    }

    /// Record the height of `block` and hand its messages over to their
    /// destination runtimes.
    pub async fn process_block(&self, src: &ChainRuntime, block: BlockInfo) {
        let chain = src.chain_id();
        let height = block.height;
        let persist = {
            let mut state = src.state().await;
            state.last_observed_height = state.last_observed_height.max(height);
            height > state.last_persisted_height
        };
        self.metrics
            .last_known_height()
            .with_label_values(&[chain, "observed"])
            .set(height as i64);

        if persist {
            match self.block_store.store_height(chain, height) {
                Ok(()) => {
                    let mut state = src.state().await;
                    state.last_persisted_height = state.last_persisted_height.max(height);
                    self.metrics
                        .last_known_height()
                        .with_label_values(&[chain, "persisted"])
                        .set(state.last_persisted_height as i64);
                }
                Err(err) => error!(?err, chain, height, "Failed to persist block height"),
            }
        }

        for message in block.messages {
            let key = message.key();
            let dst = message.dst.clone();
            match self.accept_message(message).await {
                Ok(_) => debug!(chain, height, %key, %dst, "Accepted message"),
                Err(err) => error!(?err, chain, height, %key, %dst, "Dropping message"),
            }
        }
    }

    /// Merge `message` into the cache of its destination and persist the
    /// resulting entry. Returns the cached entry.
    pub(crate) async fn accept_message(
        &self,
        message: Message,
    ) -> Result<RouteMessage, RelayerError> {
        let dst = self.runtime(&message.dst)?;
        self.check_sequence_reuse(&message)?;

        let key = message.key();
        dst.merge_messages(vec![message.clone()]).await;
        let cached = dst
            .cached_message(&key)
            .await
            .unwrap_or_else(|| RouteMessage::new(message));
        self.message_store.store_message(&cached)?;
        self.record_cache_size(dst).await;
        Ok(cached)
    }

    /// A source must not reuse a sequence number for a different destination
    /// while the first message is still pending.
    fn check_sequence_reuse(&self, message: &Message) -> Result<(), RelayerError> {
        match self.message_store.get_message(&message.key()) {
            Ok(pending) if pending.message.dst != message.dst => {
                Err(RelayerError::SequenceReuse {
                    src: message.src.clone(),
                    sn: message.sn,
                    pending_dst: pending.message.dst,
                    dst: message.dst.clone(),
                })
            }
            Ok(_) | Err(DbError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
