use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::consensus::Parameters;
use crate::engine::common::GetterConfig;
use crate::networking::timeout::TimeoutConfig;
use crate::networking::tracker::TargeterConfig;
use crate::networking::HandlerConfig;

/// Prefix of the environment variables overriding settings, e.g. `ZFX_NETWORK_ID`.
const ENV_PREFIX: &str = "ZFX";

/// Node settings. Loaded from the defaults, then an optional file, then the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listener_ip: String,
    /// Peers to connect to at startup, as `IP` or `ID@IP`. Peers given with their id are the
    /// chain's beacons.
    pub bootstrap_peers: Vec<String>,
    pub network_id: u32,
    /// Defaults to `.zfx-snow` in the home directory.
    pub data_dir: Option<String>,
    pub log_level: String,
    /// Hex encoded ed25519 keypair. Generated on first start if missing. Defaults to
    /// `node.keypair` in the data directory.
    pub keypair_file: Option<String>,
    pub genesis: String,

    pub k: usize,
    pub alpha: usize,
    pub beta_virtuous: usize,
    pub beta_rogue: usize,
    pub concurrent_repolls: usize,
    pub optimal_processing: usize,
    pub max_outstanding_items: usize,
    pub max_item_processing_time_ms: u64,

    pub initial_timeout_ms: u64,
    pub minimum_timeout_ms: u64,
    pub maximum_timeout_ms: u64,
    pub timeout_coefficient: f64,
    pub timeout_half_life_ms: u64,

    pub gossip_frequency_ms: u64,
    pub async_workers: usize,

    pub getter_max_containers: usize,
    pub getter_max_bytes: usize,
    pub getter_max_time_ms: u64,

    pub cpu_half_life_ms: u64,
    pub max_recheck_delay_ms: u64,
    pub max_processing_per_node: usize,
    pub validator_cpu_alloc: f64,
    pub max_non_validator_cpu: f64,
    pub max_non_validator_node_cpu: f64,
    pub max_clock_difference_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let params = Parameters::default();
        let timeouts = TimeoutConfig::default();
        let handler = HandlerConfig::default();
        let getter = GetterConfig::default();
        let targeter = TargeterConfig::default();
        Settings {
            listener_ip: "127.0.0.1:1234".to_owned(),
            bootstrap_peers: vec![],
            network_id: 1,
            data_dir: None,
            log_level: "info".to_owned(),
            keypair_file: None,
            genesis: "zfx-snow".to_owned(),

            k: params.k,
            alpha: params.alpha,
            beta_virtuous: params.beta_virtuous,
            beta_rogue: params.beta_rogue,
            concurrent_repolls: params.concurrent_repolls,
            optimal_processing: params.optimal_processing,
            max_outstanding_items: params.max_outstanding_items,
            max_item_processing_time_ms: params.max_item_processing_time.as_millis() as u64,

            initial_timeout_ms: timeouts.initial.as_millis() as u64,
            minimum_timeout_ms: timeouts.minimum.as_millis() as u64,
            maximum_timeout_ms: timeouts.maximum.as_millis() as u64,
            timeout_coefficient: timeouts.coefficient,
            timeout_half_life_ms: timeouts.half_life.as_millis() as u64,

            gossip_frequency_ms: handler.gossip_frequency.as_millis() as u64,
            async_workers: handler.async_workers,

            getter_max_containers: getter.max_containers,
            getter_max_bytes: getter.max_bytes,
            getter_max_time_ms: getter.max_time.as_millis() as u64,

            cpu_half_life_ms: 15_000,
            max_recheck_delay_ms: 5_000,
            max_processing_per_node: 1024,
            validator_cpu_alloc: targeter.validator_alloc,
            max_non_validator_cpu: targeter.max_non_validator_usage,
            max_non_validator_node_cpu: targeter.max_non_validator_node_usage,
            max_clock_difference_secs: 60,
        }
    }
}

impl Settings {
    /// Loads the settings, reading `path` on top of the defaults if given.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)).build()?.try_deserialize()
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".zfx-snow"),
        }
    }

    pub fn keypair_path(&self) -> PathBuf {
        match &self.keypair_file {
            Some(file) => PathBuf::from(file),
            None => self.data_dir().join("node.keypair"),
        }
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            k: self.k,
            alpha: self.alpha,
            beta_virtuous: self.beta_virtuous,
            beta_rogue: self.beta_rogue,
            concurrent_repolls: self.concurrent_repolls,
            optimal_processing: self.optimal_processing,
            max_outstanding_items: self.max_outstanding_items,
            max_item_processing_time: Duration::from_millis(self.max_item_processing_time_ms),
        }
    }

    pub fn timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig {
            initial: Duration::from_millis(self.initial_timeout_ms),
            minimum: Duration::from_millis(self.minimum_timeout_ms),
            maximum: Duration::from_millis(self.maximum_timeout_ms),
            coefficient: self.timeout_coefficient,
            half_life: Duration::from_millis(self.timeout_half_life_ms),
        }
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            gossip_frequency: Duration::from_millis(self.gossip_frequency_ms),
            async_workers: self.async_workers,
        }
    }

    pub fn getter_config(&self) -> GetterConfig {
        GetterConfig {
            max_containers: self.getter_max_containers,
            max_bytes: self.getter_max_bytes,
            max_time: Duration::from_millis(self.getter_max_time_ms),
        }
    }

    pub fn targeter_config(&self) -> TargeterConfig {
        TargeterConfig {
            validator_alloc: self.validator_cpu_alloc,
            max_non_validator_usage: self.max_non_validator_cpu,
            max_non_validator_node_usage: self.max_non_validator_node_cpu,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.parameters(), Parameters::default());
        assert_eq!(settings.timeout_config(), TimeoutConfig::default());
        assert_eq!(settings.getter_config(), GetterConfig::default());
        assert!(settings.data_dir().ends_with(".zfx-snow"));
        assert_eq!(settings.keypair_path(), settings.data_dir().join("node.keypair"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("zfx-settings-{}", crate::zfx_id::Id::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("node.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"network_id": 7, "k": 5, "alpha": 4, "bootstrap_peers": ["127.0.0.1:2000"]}}"#).unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.network_id, 7);
        assert_eq!(settings.parameters().k, 5);
        assert_eq!(settings.parameters().alpha, 4);
        assert_eq!(settings.bootstrap_peers, vec!["127.0.0.1:2000".to_owned()]);
        assert_eq!(settings.beta_rogue, Parameters::default().beta_rogue);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
