use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use relay_base::{
    db::{BlockStore, DbResult, FinalityStore, MessageStore, DB},
    CoreMetrics,
};

use crate::{settings::RelayerSettings, ChainRuntime, Chains, RelayerError};

/// Number of stored messages per source chain reloaded by one flush
pub const MAX_FLUSH_MESSAGES: usize = 10;

/// Timing and retry knobs of the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Period of the dispatch pass
    pub route_interval: Duration,
    /// Period of reloading stored messages into the caches
    pub flush_interval: Duration,
    /// Period of the delivery finality check
    pub finality_interval: Duration,
    /// Period of the expired message cleanup
    pub expiry_check_interval: Duration,
    /// Age of the last attempt after which a message is dropped
    pub message_expiry: Duration,
    /// Failed attempts after which a message leaves automatic dispatch
    pub max_retries: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            route_interval: Duration::from_secs(3),
            flush_interval: Duration::from_secs(5 * 60),
            finality_interval: Duration::from_secs(30),
            expiry_check_interval: Duration::from_secs(6 * 60 * 60),
            message_expiry: Duration::from_secs(24 * 60 * 60),
            max_retries: crate::settings::DEFAULT_MAX_RETRIES,
        }
    }
}

impl From<&RelayerSettings> for RelayConfig {
    fn from(settings: &RelayerSettings) -> Self {
        Self {
            route_interval: settings.route_interval,
            flush_interval: settings.flush_interval,
            finality_interval: settings.finality_interval,
            max_retries: settings.max_retries,
            ..Default::default()
        }
    }
}

/// State shared by every relay task and the control socket: the chain
/// runtimes, the stores and the metrics.
pub struct RelayContext {
    runtimes: BTreeMap<String, Arc<ChainRuntime>>,
    pub(crate) db: DB,
    pub(crate) block_store: BlockStore,
    pub(crate) message_store: MessageStore,
    pub(crate) finality_store: FinalityStore,
    pub(crate) config: RelayConfig,
    pub(crate) metrics: Arc<CoreMetrics>,
}

impl Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RelayContext {{ chains: {:?}, config: {:?} }}",
            self.runtimes.keys().collect::<Vec<_>>(),
            self.config
        )
    }
}

impl RelayContext {
    /// Create one runtime per chain, resuming from the heights persisted in
    /// `db`.
    pub fn new(
        chains: &Chains,
        db: DB,
        config: RelayConfig,
        metrics: Arc<CoreMetrics>,
    ) -> DbResult<Self> {
        let block_store = BlockStore::new(db.clone());
        let mut runtimes = BTreeMap::new();
        for chain in chains.iter() {
            let persisted = block_store.last_stored_height(&chain.chain_id)?;
            metrics
                .last_known_height()
                .with_label_values(&[chain.chain_id.as_str(), "persisted"])
                .set(persisted as i64);
            runtimes.insert(
                chain.chain_id.clone(),
                Arc::new(ChainRuntime::new(chain.clone(), persisted)),
            );
        }
        Ok(Self {
            runtimes,
            message_store: MessageStore::new(db.clone()),
            finality_store: FinalityStore::new(db.clone()),
            block_store,
            db,
            config,
            metrics,
        })
    }

    /// Runtime of the chain `id`
    pub fn runtime(&self, id: &str) -> Result<&Arc<ChainRuntime>, RelayerError> {
        self.runtimes
            .get(id)
            .ok_or_else(|| RelayerError::ChainNotConfigured(id.to_owned()))
    }

    /// Every runtime, ordered by chain id
    pub fn runtimes(&self) -> impl Iterator<Item = &Arc<ChainRuntime>> {
        self.runtimes.values()
    }

    /// The pending message store
    pub fn message_store(&self) -> &MessageStore {
        &self.message_store
    }

    /// The block height store
    pub fn block_store(&self) -> &BlockStore {
        &self.block_store
    }

    /// The finality tracking store
    pub fn finality_store(&self) -> &FinalityStore {
        &self.finality_store
    }

    /// Timing and retry knobs
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub(crate) async fn record_cache_size(&self, runtime: &ChainRuntime) {
        let len = runtime.cache_len().await;
        self.metrics
            .message_cache_size()
            .with_label_values(&[runtime.chain_id()])
            .set(len as i64);
    }
}
