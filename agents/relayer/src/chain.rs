use std::{collections::HashMap, sync::Arc};

use derive_new::new;

use relay_core::ChainProvider;

use crate::RelayerError;

/// A configured chain: its id, its configured start height and the provider
/// talking to it.
#[derive(Debug, Clone, new)]
pub struct Chain {
    /// Chain id
    pub chain_id: String,
    /// Height the listener starts from when nothing was persisted yet
    pub start_height: u64,
    /// Backend of the chain
    pub provider: Arc<dyn ChainProvider>,
}

/// Lookup table of the configured chains by id
#[derive(Debug, Clone, Default)]
pub struct Chains(HashMap<String, Chain>);

impl Chains {
    /// Register `chain`, replacing a chain with the same id
    pub fn insert(&mut self, chain: Chain) {
        self.0.insert(chain.chain_id.clone(), chain);
    }

    /// The chain registered under `id`
    pub fn get(&self, id: &str) -> Result<&Chain, RelayerError> {
        self.0
            .get(id)
            .ok_or_else(|| RelayerError::ChainNotConfigured(id.to_owned()))
    }

    /// Like [`Chains::get`], for wiring code where a missing chain is a bug.
    ///
    /// # Panics
    /// If no chain is registered under `id`.
    pub fn must_get(&self, id: &str) -> &Chain {
        match self.0.get(id) {
            Some(chain) => chain,
            None => panic!("chain not configured: {id}"),
        }
    }

    /// The chains registered under `ids`, in the same order. Fails on the
    /// first unknown id.
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&Chain>, RelayerError> {
        ids.iter().map(|id| self.get(id.as_ref())).collect()
    }

    /// All chains, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.0.values()
    }

    /// Number of chains
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no chain is configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Chain> for Chains {
    fn from_iter<T: IntoIterator<Item = Chain>>(iter: T) -> Self {
        let mut chains = Self::default();
        for chain in iter {
            chains.insert(chain);
        }
        chains
    }
}
