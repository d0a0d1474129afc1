use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::{
    sync::mpsc::UnboundedSender,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use relay_core::{
    DeliveryOutcome, Message, MessageKey, MessageKeyAtHeight, Pagination, RouteCallback,
    RouteMessage, TransactionObject,
};

use crate::{ChainRuntime, RelayContext, RelayerError, MAX_FLUSH_MESSAGES};

impl RelayContext {
    /// Periodic work of the relay: dispatch passes, store flushes, finality
    /// checks and expiry cleanup. Returns once cancelled, dropping its
    /// outcome sender.
    pub(crate) async fn run_router(
        self: Arc<Self>,
        outcomes: UnboundedSender<DeliveryOutcome>,
        cancel: CancellationToken,
    ) {
        let config = self.config.clone();
        let mut route = interval(config.route_interval);
        // the startup flush already ran
        let mut flush = interval_at(Instant::now() + config.flush_interval, config.flush_interval);
        let mut finality = interval(config.finality_interval);
        let mut expiry = interval(config.expiry_check_interval);
        for ticker in [&mut route, &mut flush, &mut finality, &mut expiry] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = route.tick() => self.dispatch_pass(&outcomes).await,
                _ = flush.tick() => self.flush_stored_messages().await,
                _ = finality.tick() => self.check_finality().await,
                _ = expiry.tick() => self.clean_expired_messages().await,
            }
        }
        info!("Router stopped");
    }

    /// Start a delivery for every eligible cached message. Does not wait for
    /// the deliveries.
    pub async fn dispatch_pass(&self, outcomes: &UnboundedSender<DeliveryOutcome>) {
        for dst in self.runtimes() {
            self.dispatch_chain(dst, outcomes).await;
        }
    }

    async fn dispatch_chain(
        &self,
        dst: &Arc<ChainRuntime>,
        outcomes: &UnboundedSender<DeliveryOutcome>,
    ) {
        let now = Utc::now();
        let candidates: Vec<RouteMessage> = {
            let state = dst.state().await;
            state
                .cache
                .iter()
                .filter(|m| !m.is_processing(now))
                .cloned()
                .collect()
        };

        for candidate in candidates {
            let key = candidate.key();
            let src = match self.runtime(&candidate.message.src) {
                Ok(src) => src,
                Err(err) => {
                    error!(?err, dst = dst.chain_id(), %key, "Source chain of cached message is not configured, dropping it");
                    dst.clear_messages(&[key]).await;
                    continue;
                }
            };
            if !dst.should_send_message(Some(&candidate), src).await {
                debug!(dst = dst.chain_id(), %key, "Message not eligible for delivery");
                continue;
            }

            match dst.provider().message_received(&key).await {
                Ok(true) => {
                    info!(dst = dst.chain_id(), %key, "Message already received on destination");
                    self.forget_message(dst, &key).await;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(?err, dst = dst.chain_id(), %key, "Failed to query message receipt");
                    continue;
                }
            }

            // The gate ran without the lock; claim the entry only if no other
            // pass got to it in the meantime.
            let claimed = {
                let mut state = dst.state().await;
                match state.cache.get_mut(&key) {
                    Some(entry) if !entry.is_processing(Utc::now()) => {
                        entry.set_processing();
                        Some(entry.message.clone())
                    }
                    _ => None,
                }
            };
            if let Some(message) = claimed {
                Self::spawn_delivery(dst.clone(), message, outcomes.clone());
            }
        }
    }

    fn spawn_delivery(
        dst: Arc<ChainRuntime>,
        message: Message,
        outcomes: UnboundedSender<DeliveryOutcome>,
    ) {
        let key = message.key();
        let span = info_span!("Delivery", dst = dst.chain_id(), %key);
        let callback = RouteCallback::new(key, dst.chain_id().to_owned(), outcomes);
        tokio::spawn(
            async move {
                debug!("Routing message");
                // The callback belongs to the provider now and reports the
                // outcome of this attempt either way.
                if let Err(err) = dst.provider().route(&message, callback).await {
                    warn!(?err, "Failed to submit delivery");
                }
            }
            .instrument(span),
        );
    }

    /// Delete a message from the store and from its destination cache.
    pub(crate) async fn forget_message(&self, dst: &ChainRuntime, key: &MessageKey) {
        if let Err(err) = self.message_store.delete_message(key) {
            error!(?err, %key, "Failed to delete message from store");
        }
        dst.clear_messages(&[key.clone()]).await;
        self.record_cache_size(dst).await;
    }

    /// Load stored messages that still have retries left into their
    /// destination caches, without touching entries that are already cached.
    pub async fn flush_stored_messages(&self) {
        let max_retries = self.config.max_retries;
        let mut flushed = 0usize;
        for src in self.runtimes() {
            let stored = match self
                .message_store
                .get_messages(src.chain_id(), Pagination::default().get_all())
            {
                Ok(stored) => stored,
                Err(err) => {
                    error!(?err, chain = src.chain_id(), "Failed to load stored messages");
                    continue;
                }
            };
            let active = stored
                .into_iter()
                .filter(|m| !m.retries_exhausted(max_retries))
                .take(MAX_FLUSH_MESSAGES);
            for mut message in active {
                let Ok(dst) = self.runtime(&message.message.dst) else {
                    warn!(chain = src.chain_id(), key = %message.key(), dst = %message.message.dst, "Stored message targets an unconfigured chain");
                    continue;
                };
                // no delivery survives a restart
                message.processing = false;
                if dst.state().await.cache.insert_if_absent(message) {
                    flushed += 1;
                }
                self.record_cache_size(dst).await;
            }
        }
        debug!(flushed, "Flushed stored messages into the caches");
    }

    /// Drop finality tracking of deliveries that are final, and relay again
    /// the messages whose delivery disappeared from the destination.
    pub async fn check_finality(&self) {
        let tracked = match self
            .finality_store
            .get_tx_objects(Pagination::default().get_all())
        {
            Ok(tracked) => tracked,
            Err(err) => {
                error!(?err, "Failed to load tracked deliveries");
                return;
            }
        };

        for tx in tracked {
            let Ok(dst) = self.runtime(&tx.dst) else {
                warn!(dst = %tx.dst, key = %tx.key, "Tracked delivery on an unconfigured chain");
                continue;
            };
            let depth = dst.provider().finality_depth();
            let latest = match dst.provider().query_latest_height().await {
                Ok(latest) => latest,
                Err(err) => {
                    warn!(?err, dst = %tx.dst, "Failed to query latest height");
                    continue;
                }
            };
            if tx.tx_height + depth > latest {
                continue;
            }

            let receipt = match dst.provider().query_transaction_receipt(&tx.tx_hash).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    warn!(?err, key = %tx.key, tx_hash = %tx.tx_hash, "Failed to query delivery receipt");
                    continue;
                }
            };
            if let Err(err) = self.finality_store.delete_tx_object(&tx.dst, &tx.key) {
                error!(?err, key = %tx.key, "Failed to delete tracked delivery");
                continue;
            }
            if receipt.status {
                debug!(key = %tx.key, tx_hash = %tx.tx_hash, "Delivery is final");
                continue;
            }

            warn!(key = %tx.key, tx_hash = %tx.tx_hash, "Delivery missing after finality, relaying again");
            if let Err(err) = self.regenerate(&tx).await {
                error!(?err, key = %tx.key, "Failed to regenerate message");
            }
        }
    }

    async fn regenerate(&self, tx: &TransactionObject) -> Result<(), RelayerError> {
        let src = self.runtime(&tx.key.src)?;
        let query = MessageKeyAtHeight::new(tx.key.clone(), tx.message_height);
        let messages = src.provider().generate_messages(&query).await?;
        for message in messages.into_iter().filter(|m| m.key() == tx.key) {
            self.accept_message(message).await?;
        }
        Ok(())
    }

    /// Drop messages whose last attempt is older than the expiry from the
    /// store and the caches.
    pub async fn clean_expired_messages(&self) {
        let Ok(expiry) = ChronoDuration::from_std(self.config.message_expiry) else {
            return;
        };
        let now = Utc::now();
        let stored = match self
            .message_store
            .get_messages("", Pagination::default().get_all())
        {
            Ok(stored) => stored,
            Err(err) => {
                error!(?err, "Failed to load stored messages");
                return;
            }
        };
        for message in stored.iter().filter(|m| m.is_elapsed(expiry, now)) {
            let key = message.key();
            info!(%key, dst = %message.message.dst, retry = message.retry, "Dropping expired message");
            match self.runtime(&message.message.dst) {
                Ok(dst) => self.forget_message(dst, &key).await,
                Err(_) => {
                    if let Err(err) = self.message_store.delete_message(&key) {
                        error!(?err, %key, "Failed to delete message from store");
                    }
                }
            }
        }
    }
}
