use std::sync::Arc;

use eyre::{eyre, Context, Result};
use serde::Deserialize;

use relay_core::ChainProvider;
use relay_mockchain::{MockChainConf, MockProvider};

/// Backend type tag of a configured chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainType {
    /// Deterministic in-process chain used for testing
    Mock,
    /// EVM compatible chains
    Evm,
    /// Cosmos SDK chains
    Cosmos,
    /// ICON
    Icon,
    /// Sui
    Sui,
    /// Solana
    Solana,
    /// Stellar
    Stellar,
}

/// Configuration of one chain
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConf {
    /// Backend selector
    #[serde(rename = "type")]
    pub chain_type: ChainType,
    /// Height the listener starts from when nothing was persisted yet
    #[serde(default)]
    pub start_height: u64,
    /// Skip this chain entirely
    #[serde(default)]
    pub disabled: bool,
    /// Parameters of the mock backend
    #[serde(default)]
    pub mock: MockChainConf,
}

impl ChainConf {
    /// Build the provider for the chain registered under `chain_id`
    pub async fn build_provider(&self, chain_id: &str) -> Result<Arc<dyn ChainProvider>> {
        let provider: Arc<dyn ChainProvider> = match self.chain_type {
            ChainType::Mock => Arc::new(MockProvider::new(chain_id.to_owned(), self.mock.clone())),
            other => {
                return Err(eyre!(
                    "Chain {chain_id} has type `{other}`, which has no backend in this build"
                ))
            }
        };
        provider
            .init()
            .await
            .with_context(|| format!("Initializing provider for chain {chain_id}"))?;
        Ok(provider)
    }
}
