use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use relay_core::{
    ChainResult, DeliveryOutcome, MessageKey, RouteMessage, TransactionObject, TxResponse,
};

use crate::{ChainRuntime, RelayContext};

impl RelayContext {
    /// Apply delivery outcomes until every sender is gone.
    pub(crate) async fn run_completion(
        self: Arc<Self>,
        mut outcomes: UnboundedReceiver<DeliveryOutcome>,
    ) {
        while let Some(outcome) = outcomes.recv().await {
            self.handle_outcome(outcome).await;
        }
        info!("All delivery outcomes processed");
    }

    /// Apply the outcome of one delivery attempt to the cache and the stores.
    pub async fn handle_outcome(&self, outcome: DeliveryOutcome) {
        let DeliveryOutcome { key, dst, result } = outcome;
        let dst = match self.runtime(&dst) {
            Ok(dst) => dst,
            Err(err) => {
                error!(?err, %key, "Delivery outcome for an unconfigured chain");
                return;
            }
        };
        let cached = dst.cached_message(&key).await;

        match result {
            Ok(response) if response.is_success() => {
                self.on_delivered(dst, &key, cached, response).await
            }
            result => match cached {
                Some(message) => self.on_failed(dst, message, result).await,
                None => warn!(%key, dst = dst.chain_id(), ?result, "Failed delivery of a message that is no longer cached"),
            },
        }
    }

    async fn on_delivered(
        &self,
        dst: &ChainRuntime,
        key: &MessageKey,
        cached: Option<RouteMessage>,
        response: TxResponse,
    ) {
        let message_height = cached
            .as_ref()
            .map(|m| m.message.message_height)
            .or_else(|| {
                self.message_store
                    .get_message(key)
                    .ok()
                    .map(|m| m.message.message_height)
            });

        if dst.provider().finality_depth() > 0 {
            match message_height {
                Some(message_height) => {
                    let tx = TransactionObject::new(
                        key.clone(),
                        dst.chain_id().to_owned(),
                        message_height,
                        response.tx_hash.clone(),
                        response.height,
                    );
                    debug!(%key, tx_hash = %tx.tx_hash, "Tracking delivery until it is final");
                    if let Err(err) = self.finality_store.store_tx_object(&tx) {
                        error!(?err, %key, "Failed to track delivery for finality");
                    }
                }
                None => warn!(%key, "Height of delivered message unknown, not tracking finality"),
            }
        }

        self.forget_message(dst, key).await;
        self.metrics
            .messages_processed_count()
            .with_label_values(&[key.src.as_str(), dst.chain_id()])
            .inc();
        info!(
            %key,
            dst = dst.chain_id(),
            tx_hash = %response.tx_hash,
            height = response.height,
            retry = cached.map(|m| m.retry).unwrap_or_default(),
            "Message relayed successfully"
        );
    }

    async fn on_failed(
        &self,
        dst: &ChainRuntime,
        message: RouteMessage,
        result: ChainResult<TxResponse>,
    ) {
        let key = message.key();
        let updated = {
            let mut state = dst.state().await;
            let Some(entry) = state.cache.get_mut(&key) else {
                return;
            };
            entry.record_failure(Utc::now());
            entry.clone()
        };
        self.metrics
            .delivery_failures()
            .with_label_values(&[key.src.as_str(), dst.chain_id()])
            .inc();
        if let Err(err) = self.message_store.store_message(&updated) {
            error!(?err, %key, "Failed to persist failed attempt");
        }

        let (tx_hash, err) = match &result {
            Ok(response) => (Some(response.tx_hash.as_str()), None),
            Err(err) => (None, Some(err)),
        };
        if updated.retries_exhausted(self.config.max_retries) {
            dst.clear_messages(&[key.clone()]).await;
            self.record_cache_size(dst).await;
            warn!(
                %key,
                dst = dst.chain_id(),
                retry = updated.retry,
                ?tx_hash,
                ?err,
                "Message reached the maximum number of retries, it stays in the store until relayed manually"
            );
        } else {
            error!(
                %key,
                dst = dst.chain_id(),
                retry = updated.retry,
                next_attempt = ?updated.last_try,
                ?tx_hash,
                ?err,
                "Message delivery failed"
            );
        }
    }
}
