//! Common settings and configuration for the relayer
//!
//! ### Configuration
//!
//! Settings are read from the config files, then from the environment.
//!
//! Configuration key/value pairs are loaded in the following order, with later
//! sources taking precedence:
//!
//! 1. The files matching `./config/*.json`.
//! 2. The order of configs in `CONFIG_FILES` with each sequential one
//!    overwriting previous ones as appropriate.
//! 3. Configuration env vars with the prefix `RLY_`, using `__` to descend
//!    into nested objects. E.g. `export RLY_CHAINS__MOCK-1__START_HEIGHT=100`
//!
//! Keys are case insensitive and use snake_case, e.g.
//!
//! ```json
//! {
//!   "db": "./relayer_db",
//!   "chains": {
//!     "mock-1": { "type": "mock", "start_height": 10, "mock": { "initial_height": 10 } }
//!   },
//!   "tracing": { "fmt": "json", "level": "info" }
//! }
//! ```

use std::{collections::HashMap, path::PathBuf};

use serde::Deserialize;

pub use chains::*;
pub use loader::*;
pub use trace::*;

mod chains;
mod loader;
mod trace;

/// Settings shared by every agent built on this crate
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Configured chains by chain id
    #[serde(default)]
    pub chains: HashMap<String, ChainConf>,
    /// Path of the rocksdb directory
    #[serde(default = "default_db_path")]
    pub db: PathBuf,
    /// Port to listen for prometheus scrape requests
    #[serde(default)]
    pub metrics_port: Option<u16>,
    /// The tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relayer_db")
}

impl Settings {
    /// Chains that are not disabled, sorted by chain id
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConf)> {
        let mut chains: Vec<_> = self.chains.iter().filter(|(_, c)| !c.disabled).collect();
        chains.sort_by(|a, b| a.0.cmp(b.0));
        chains
    }
}

impl AsRef<Settings> for Settings {
    fn as_ref(&self) -> &Settings {
        self
    }
}
