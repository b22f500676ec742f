//! Configuration (SPEC_FULL §10.3), structured the way the teacher's
//! daemon config is: nested TOML sections, per-field `serde` defaults, and
//! an env-var override for the data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DATA_DIR_ENV_VAR: &str = "DHT_NODE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DhtNodeConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for DhtNodeConfig {
    fn default() -> Self {
        DhtNodeConfig {
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_address: String,
    pub bootstrap_seeds: Vec<String>,
    pub k: usize,
    pub alpha: usize,
    pub rpc_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub lookup_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            listen_address: default_listen_address(),
            bootstrap_seeds: Vec::new(),
            k: dht_core::K,
            alpha: dht_core::ALPHA,
            rpc_timeout_secs: dht_core::pending::RPC_TIMEOUT.as_secs(),
            response_timeout_secs: dht_core::pending::RESPONSE_TIMEOUT.as_secs(),
            lookup_timeout_secs: 20,
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:4222".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub record_ttl_secs: u64,
    pub replicate_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            record_ttl_secs: 86_400,
            replicate_interval_secs: dht_core::REPLICATE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl DhtNodeConfig {
    /// Load from `path` if it exists, falling back to [`Default`]
    /// otherwise. The data directory used for any future on-disk state is
    /// taken from `DHT_NODE_DATA_DIR` if set, else a platform default.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: DhtNodeConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Ok(DhtNodeConfig::default())
        }
    }

    pub fn data_dir() -> PathBuf {
        std::env::var(DATA_DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".dht-node"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core_constants() {
        let config = DhtNodeConfig::default();
        assert_eq!(config.network.k, dht_core::K);
        assert_eq!(config.network.alpha, dht_core::ALPHA);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = DhtNodeConfig::load(Path::new("/nonexistent/path.toml")).unwrap();
        assert_eq!(config.network.listen_address, "0.0.0.0:4222");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DhtNodeConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: DhtNodeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.network.k, config.network.k);
    }
}
