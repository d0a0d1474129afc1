//! Relayer configuration
//!
//! Relayer specific keys live next to the shared [`Settings`] keys at the top
//! level of the configuration, e.g.
//!
//! ```json
//! {
//!   "chains": { "mock-1": { "type": "mock" } },
//!   "fresh": false,
//!   "route_interval_secs": 3,
//!   "max_retries": 5,
//!   "socket_dir": "/var/run/relay"
//! }
//! ```

use std::{path::PathBuf, time::Duration};

use derive_more::{AsRef, Deref};
use eyre::{eyre, Result};
use serde::Deserialize;

use relay_base::{
    settings::{deserialize_settings, load_config, Settings},
    LoadableFromSettings,
};

/// Default number of failed attempts after which a message leaves automatic
/// dispatch
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Settings for `Relayer`
#[derive(Debug, Clone, AsRef, Deref)]
pub struct RelayerSettings {
    #[as_ref]
    #[deref]
    /// Shared agent settings
    pub base: Settings,

    /// Wipe the database before starting
    pub fresh: bool,
    /// Period of reloading stored messages into the caches
    pub flush_interval: Duration,
    /// Period of the dispatch pass
    pub route_interval: Duration,
    /// Period of the delivery finality check
    pub finality_interval: Duration,
    /// Failed attempts after which a message leaves automatic dispatch
    pub max_retries: u32,
    /// Directory holding the control socket
    pub socket_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawRelayerConf {
    #[serde(default)]
    fresh: bool,
    #[serde(default = "default_flush_interval_secs")]
    flush_interval_secs: u64,
    #[serde(default = "default_route_interval_secs")]
    route_interval_secs: u64,
    #[serde(default = "default_finality_interval_secs")]
    finality_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default)]
    socket_dir: Option<PathBuf>,
}

fn default_flush_interval_secs() -> u64 {
    5 * 60
}

fn default_route_interval_secs() -> u64 {
    3
}

fn default_finality_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn positive_secs(name: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(eyre!("`{name}` must be a positive number of seconds"));
    }
    Ok(Duration::from_secs(secs))
}

impl RelayerSettings {
    fn from_parts(base: Settings, raw: RawRelayerConf) -> Result<Self> {
        if raw.max_retries == 0 {
            return Err(eyre!("`max_retries` must be at least 1"));
        }
        Ok(Self {
            base,
            fresh: raw.fresh,
            flush_interval: positive_secs("flush_interval_secs", raw.flush_interval_secs)?,
            route_interval: positive_secs("route_interval_secs", raw.route_interval_secs)?,
            finality_interval: positive_secs(
                "finality_interval_secs",
                raw.finality_interval_secs,
            )?,
            max_retries: raw.max_retries,
            socket_dir: raw.socket_dir.unwrap_or_else(std::env::temp_dir),
        })
    }
}

impl LoadableFromSettings for RelayerSettings {
    fn load() -> Result<Self> {
        let config = load_config()?;
        let base: Settings = deserialize_settings(&config)?;
        let raw: RawRelayerConf = deserialize_settings(&config)?;
        Self::from_parts(base, raw)
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(json: &str) -> Result<RelayerSettings> {
        let config = Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()?;
        RelayerSettings::from_parts(
            deserialize_settings(&config)?,
            deserialize_settings(&config)?,
        )
    }

    #[test]
    fn defaults() {
        let settings = parse(r#"{"chains": {"mock-1": {"type": "mock"}}}"#).unwrap();
        assert!(!settings.fresh);
        assert_eq!(settings.route_interval, Duration::from_secs(3));
        assert_eq!(settings.flush_interval, Duration::from_secs(300));
        assert_eq!(settings.finality_interval, Duration::from_secs(30));
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.socket_dir, std::env::temp_dir());
        assert_eq!(settings.chains.len(), 1);
    }

    #[test]
    fn overrides() {
        let settings = parse(
            r#"{"fresh": true, "route_interval_secs": 1, "max_retries": 2, "socket_dir": "/run/relay"}"#,
        )
        .unwrap();
        assert!(settings.fresh);
        assert_eq!(settings.route_interval, Duration::from_secs(1));
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.socket_dir, PathBuf::from("/run/relay"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(parse(r#"{"route_interval_secs": 0}"#).is_err());
        assert!(parse(r#"{"max_retries": 0}"#).is_err());
    }
}
