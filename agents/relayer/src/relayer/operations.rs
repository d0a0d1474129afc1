//! Operator commands, served through the control socket.

use tracing::{info, warn};

use relay_core::{MessageKey, MessageKeyAtHeight, Pagination, RouteMessage};

use crate::{
    control::protocol::{ResGetBlock, ResMessageList, ResMessageRemove},
    RelayContext, RelayerError,
};

impl RelayContext {
    /// Persisted height of `chain`, or of every chain when `all` is set
    pub async fn get_block(&self, chain: &str, all: bool) -> Result<Vec<ResGetBlock>, RelayerError> {
        if all {
            let mut blocks = Vec::new();
            for runtime in self.runtimes() {
                let height = runtime.state().await.last_persisted_height;
                blocks.push(ResGetBlock {
                    chain: runtime.chain_id().to_owned(),
                    height,
                });
            }
            return Ok(blocks);
        }
        self.runtime(chain)?;
        Ok(vec![ResGetBlock {
            chain: chain.to_owned(),
            height: self.block_store.last_stored_height(chain)?,
        }])
    }

    /// A page of the stored messages of `chain`, with the chain's total
    pub fn get_message_list(
        &self,
        chain: &str,
        pagination: Pagination,
    ) -> Result<ResMessageList, RelayerError> {
        let messages = self.message_store.get_messages(chain, pagination)?;
        let total = self.message_store.total_count_by_chain(chain)?;
        Ok(ResMessageList { messages, total })
    }

    /// Queue a message for delivery again.
    ///
    /// With a height, the message is regenerated from the source chain state
    /// at that height. Without one, the stored copy is replayed with its
    /// attempts reset.
    pub async fn relay_message(
        &self,
        chain: &str,
        sn: u64,
        height: Option<u64>,
    ) -> Result<RouteMessage, RelayerError> {
        let src = self.runtime(chain)?;
        let key = MessageKey::new(chain.to_owned(), sn);

        let Some(height) = height else {
            let mut stored = self.message_store.get_message(&key)?;
            stored.reset_attempts();
            let dst = self.runtime(&stored.message.dst)?;
            dst.merge_messages(vec![stored.message.clone()]).await;
            let cached = dst.cached_message(&key).await.unwrap_or(stored);
            self.message_store.store_message(&cached)?;
            self.record_cache_size(dst).await;
            info!(%key, "Replaying stored message");
            return Ok(cached);
        };

        let query = MessageKeyAtHeight::new(key.clone(), height);
        let message = src
            .provider()
            .generate_messages(&query)
            .await?
            .into_iter()
            .find(|m| m.sn == sn)
            .ok_or_else(|| RelayerError::MessageNotFound {
                key: key.clone(),
                height,
            })?;
        info!(%key, height, "Relaying regenerated message");
        self.accept_message(message).await
    }

    /// Delete a pending message from the store and its destination cache
    pub async fn remove_message(&self, chain: &str, sn: u64) -> Result<ResMessageRemove, RelayerError> {
        let key = MessageKey::new(chain.to_owned(), sn);
        let stored = self.message_store.get_message(&key)?;
        match self.runtime(&stored.message.dst) {
            Ok(dst) => self.forget_message(dst, &key).await,
            Err(_) => self.message_store.delete_message(&key)?,
        }
        info!(%key, "Removed message");
        Ok(ResMessageRemove {
            sn,
            chain: chain.to_owned(),
            dst: stored.message.dst,
            height: stored.message.message_height,
            event: stored.message.event_type,
        })
    }

    /// Revert message `sn` on its source chain
    pub async fn revert_message(&self, chain: &str, sn: u64) -> Result<(), RelayerError> {
        self.runtime(chain)?.provider().revert_message(sn).await?;
        info!(chain, sn, "Reverted message");
        Ok(())
    }

    /// Fee configured on `chain` for `network`
    pub async fn get_fee(&self, chain: &str, network: &str, response: bool) -> Result<u64, RelayerError> {
        Ok(self
            .runtime(chain)?
            .provider()
            .get_fee(network, response)
            .await?)
    }

    /// Set the fees of `chain` for `network`
    pub async fn set_fee(
        &self,
        chain: &str,
        network: &str,
        msg_fee: u64,
        res_fee: u64,
    ) -> Result<(), RelayerError> {
        self.runtime(chain)?
            .provider()
            .set_fee(network, msg_fee, res_fee)
            .await?;
        info!(chain, network, msg_fee, res_fee, "Fee updated");
        Ok(())
    }

    /// Claim the fees collected on `chain`
    pub async fn claim_fee(&self, chain: &str) -> Result<(), RelayerError> {
        self.runtime(chain)?.provider().claim_fee().await?;
        info!(chain, "Fee claimed");
        Ok(())
    }

    /// Latest height reported by `chain`
    pub async fn current_height(&self, chain: &str) -> Result<u64, RelayerError> {
        Ok(self.runtime(chain)?.provider().query_latest_height().await?)
    }

    /// Wipe the whole database. Cached messages are left alone.
    pub fn prune_db(&self) -> Result<(), RelayerError> {
        warn!("Pruning the database");
        self.db.clear()?;
        Ok(())
    }
}
