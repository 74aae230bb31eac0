//! Service configuration with TOML file support.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use maker_types::{Address, ChainId, ChainSettings};
use maker_validator::COINBASE_RATES_URL;
use serde::{Deserialize, Serialize};

use crate::SequencerError;

/// Configuration for the maker settlement service.
///
/// Can be loaded from a TOML file via [`SequencerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Signer addresses this service pays from. Keys come from the
    /// environment variable named by each lower-cased address.
    #[serde(default)]
    pub makers: Vec<Address>,

    /// Directory of the LMDB environment (serial log, nonces).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// JSON document describing chains and their tokens.
    #[serde(default = "default_chains_file")]
    pub chains_file: PathBuf,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Expose the Prometheus text encoding through
    /// `MakerService::metrics_text`.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Period of the deposit ingestion tick.
    #[serde(default = "default_tick_ms")]
    pub ingest_interval_ms: u64,

    /// Period of the pool monitor tick.
    #[serde(default = "default_tick_ms")]
    pub monitor_interval_ms: u64,

    #[serde(default = "default_nonce_refresh_interval_secs")]
    pub nonce_refresh_interval_secs: u64,

    /// Idle time after which a signer's nonce is re-read from the chain.
    #[serde(default = "default_nonce_idle_threshold_secs")]
    pub nonce_idle_threshold_secs: u64,

    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    #[serde(default = "default_oracle_refresh_interval_secs")]
    pub oracle_refresh_interval_secs: u64,

    /// Age after which a cached exchange rate is ignored.
    #[serde(default = "default_oracle_rate_ttl_secs")]
    pub oracle_rate_ttl_secs: u64,

    /// Timeout applied to every outbound HTTP request.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Recipients that are never paid.
    #[serde(default)]
    pub blacklist: Vec<Address>,

    /// Per-chain tunables; chains not listed use [`ChainSettings::default`].
    #[serde(default)]
    pub chains: HashMap<ChainId, ChainSettings>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./maker_data")
}

fn default_chains_file() -> PathBuf {
    PathBuf::from("./chains.json")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_ms() -> u64 {
    5_000
}

fn default_nonce_refresh_interval_secs() -> u64 {
    60
}

fn default_nonce_idle_threshold_secs() -> u64 {
    300
}

fn default_oracle_url() -> String {
    COINBASE_RATES_URL.to_string()
}

fn default_oracle_refresh_interval_secs() -> u64 {
    5
}

fn default_oracle_rate_ttl_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    10
}

// ── Impl ───────────────────────────────────────────────────────────────

impl SequencerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, SequencerError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SequencerError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, SequencerError> {
        toml::from_str(s).map_err(|e| SequencerError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, SequencerError> {
        toml::to_string_pretty(self).map_err(|e| SequencerError::Config(e.to_string()))
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_millis(self.ingest_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn nonce_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_refresh_interval_secs)
    }

    pub fn nonce_idle_threshold(&self) -> Duration {
        Duration::from_secs(self.nonce_idle_threshold_secs)
    }

    pub fn oracle_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.oracle_refresh_interval_secs)
    }

    pub fn oracle_rate_ttl(&self) -> Duration {
        Duration::from_secs(self.oracle_rate_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            makers: Vec::new(),
            data_dir: default_data_dir(),
            chains_file: default_chains_file(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            ingest_interval_ms: default_tick_ms(),
            monitor_interval_ms: default_tick_ms(),
            nonce_refresh_interval_secs: default_nonce_refresh_interval_secs(),
            nonce_idle_threshold_secs: default_nonce_idle_threshold_secs(),
            oracle_url: default_oracle_url(),
            oracle_refresh_interval_secs: default_oracle_refresh_interval_secs(),
            oracle_rate_ttl_secs: default_oracle_rate_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            blacklist: Vec::new(),
            chains: HashMap::new(),
        }
    }
}
