//! Load a settings object from the config locations.

use std::{env, path::PathBuf};

use config::{Config, Environment, File};
use eyre::{eyre, Context, Result};
use serde::de::DeserializeOwned;

/// Prefix of the environment variables overriding config values
pub const ENV_PREFIX: &str = "RLY";

/// Collect every config source into one [`Config`].
pub fn load_config() -> Result<Config> {
    let mut builder = Config::builder();

    // The default config directory is optional
    let config_dir = PathBuf::from("./config");
    if config_dir.is_dir() {
        let mut files = config_dir
            .read_dir()
            .context("Failed to open config directory")?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension() == Some("json".as_ref()))
            .collect::<Vec<_>>();
        files.sort();
        for path in files {
            builder = builder.add_source(File::from(path));
        }
    }

    // Load a set of additional user specified config files
    let config_file_paths: Vec<String> = env::var("CONFIG_FILES")
        .map(|s| s.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    for path in &config_file_paths {
        let p = PathBuf::from(path);
        if p.is_file() {
            if p.extension() == Some("json".as_ref()) {
                builder = builder.add_source(File::from(p));
            } else {
                return Err(eyre!(
                    "Provided config path via CONFIG_FILES is of an unsupported type ({p:?})"
                ));
            }
        } else if !p.exists() {
            return Err(eyre!(
                "Provided config path via CONFIG_FILES does not exist ({p:?})"
            ));
        } else {
            return Err(eyre!(
                "Provided config path via CONFIG_FILES is not a file ({p:?})"
            ));
        }
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to load config sources")
}

/// Deserialize a settings object out of a loaded [`Config`]
pub fn deserialize_settings<T: DeserializeOwned>(config: &Config) -> Result<T> {
    config
        .clone()
        .try_deserialize::<T>()
        .context("Config deserialization error, please check the configuration")
}

#[cfg(test)]
mod test {
    use config::FileFormat;

    use crate::settings::{ChainType, Settings};

    use super::*;

    #[test]
    fn deserializes_settings_from_json() {
        let config = Config::builder()
            .add_source(File::from_str(
                r#"{
                    "db": "/tmp/relay",
                    "metrics_port": 9090,
                    "chains": {
                        "mock-1": {"type": "mock", "start_height": 10},
                        "mock-2": {"type": "mock", "disabled": true, "mock": {"finality_block": 2}}
                    },
                    "tracing": {"fmt": "json", "level": "debug"}
                }"#,
                FileFormat::Json,
            ))
            .build()
            .unwrap();
        let settings: Settings = deserialize_settings(&config).unwrap();
        assert_eq!(settings.db, PathBuf::from("/tmp/relay"));
        assert_eq!(settings.metrics_port, Some(9090));
        assert_eq!(settings.chains["mock-1"].chain_type, ChainType::Mock);
        assert_eq!(settings.chains["mock-1"].start_height, 10);
        assert_eq!(settings.chains["mock-2"].mock.finality_block, 2);

        let enabled = settings.enabled_chains();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].0, "mock-1");
    }

    #[test]
    fn unknown_chain_type_is_a_config_error() {
        let config = Config::builder()
            .add_source(File::from_str(
                r#"{"chains": {"x": {"type": "bitcoin-ordinals"}}}"#,
                FileFormat::Json,
            ))
            .build()
            .unwrap();
        assert!(deserialize_settings::<Settings>(&config).is_err());
    }
}
