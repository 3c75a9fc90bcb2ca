use crate::evaluator::{Metric, Threshold};
use crate::feeds::{catalog, MonitoredFeed, SourceRegistry};
use crate::query::{decode_query, encode_query, lookup, query_id};

use alloy::primitives::{Address, B256};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("feed #{index}: {reason}")]
    InvalidFeed { index: usize, reason: String },
    #[error("chain {chain_id}: {reason}")]
    InvalidChain { chain_id: u64, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub dispute: DisputeConfig,
    /// Raw `[[feeds]]` entries; each is deserialized in [`Config::build_feeds`]
    /// so a malformed entry rejects the feed list and nothing else.
    #[serde(default)]
    pub feeds: Vec<toml::Value>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling cycles.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    /// Blocks re-scanned behind the cursor every poll.
    #[serde(default = "default_reorg_margin")]
    pub reorg_margin: u64,
    /// How far behind the head the first poll of a unit starts.
    #[serde(default)]
    pub initial_block_offset: u64,
    /// Largest `eth_getLogs` window.
    #[serde(default = "default_max_window_blocks")]
    pub max_window_blocks: u64,
    /// Per-unit poll timeout; 0 disables it.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Percentage threshold for feeds synthesized on the fly (alert only).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Alert on every report, and keep undecidable ones.
    #[serde(default)]
    pub see_all_values: bool,
    /// Number of tx hashes remembered for run-level dedup.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Timeout for trusted-value HTTP requests.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub name: String,
    /// May hold a `{PLACEHOLDER}`; such chains are skipped until set.
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub explorer: Option<String>,
    /// Oracle contract emitting `NewReport`.
    #[serde(default)]
    pub oracle_address: Option<Address>,
    /// Token contract emitting oracle address changes.
    #[serde(default)]
    pub token_address: Option<Address>,
    #[serde(default)]
    pub governance_address: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_dispute_chain")]
    pub chain_id: u64,
    /// Allowance granted to governance, as a multiple of the fee.
    #[serde(default = "default_approve_multiplier")]
    pub approve_multiplier: u64,
    /// Loaded from env DISPUTER_PRIVATE_KEY only.
    #[serde(skip)]
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// `0x`-prefixed query id or a catalog tag such as `eth-usd-spot`.
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub params: Option<toml::Table>,
    pub threshold: ThresholdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    #[serde(rename = "type")]
    pub metric: Metric,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines file receiving one row per displayed report.
    #[serde(default)]
    pub rows_path: Option<String>,
}

fn default_wait_secs() -> u64 {
    7
}
fn default_reorg_margin() -> u64 {
    10
}
fn default_max_window_blocks() -> u64 {
    1000
}
fn default_rpc_timeout_secs() -> u64 {
    15
}
fn default_confidence_threshold() -> f64 {
    0.1
}
fn default_dedup_capacity() -> usize {
    1024
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_dispute_chain() -> u64 {
    1
}
fn default_approve_multiplier() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_wait_secs(),
            reorg_margin: default_reorg_margin(),
            initial_block_offset: 0,
            max_window_blocks: default_max_window_blocks(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            confidence_threshold: default_confidence_threshold(),
            see_all_values: false,
            dedup_capacity: default_dedup_capacity(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chain_id: default_dispute_chain(),
            approve_multiplier: default_approve_multiplier(),
            private_key: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl MonitorConfig {
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_secs > 0).then(|| Duration::from_secs(self.rpc_timeout_secs))
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        // Secrets never live in the config file.
        if let Ok(key) = std::env::var("DISPUTER_PRIVATE_KEY") {
            self.dispute.private_key = key;
        }
        for chain in &mut self.chains {
            if let Ok(url) = std::env::var(format!("RPC_URL_{}", chain.chain_id)) {
                chain.rpc_url = url;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(ConfigError::InvalidChain {
                    chain_id: chain.chain_id,
                    reason: "configured twice".to_string(),
                });
            }
            if chain.oracle_address.is_none() && chain.token_address.is_none() {
                return Err(ConfigError::InvalidChain {
                    chain_id: chain.chain_id,
                    reason: "needs an oracle_address or token_address".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn rpc_urls(&self) -> HashMap<u64, String> {
        self.chains
            .iter()
            .map(|c| (c.chain_id, c.rpc_url.clone()))
            .collect()
    }

    pub fn explorers(&self) -> HashMap<u64, String> {
        self.chains
            .iter()
            .filter_map(|c| c.explorer.clone().map(|e| (c.chain_id, e)))
            .collect()
    }

    pub fn has_dispute_key(&self) -> bool {
        !self.dispute.private_key.trim().is_empty()
    }

    /// Build the monitored feeds. Any malformed entry rejects the whole list.
    pub fn build_feeds(&self, registry: &SourceRegistry) -> Result<Vec<MonitoredFeed>, ConfigError> {
        self.feeds
            .iter()
            .enumerate()
            .map(|(index, feed)| {
                build_feed(feed, registry).map_err(|reason| ConfigError::InvalidFeed { index, reason })
            })
            .collect()
    }
}

/// Re-read only the feed list from `path`.
pub fn reload_feeds(path: &Path, registry: &SourceRegistry) -> Result<Vec<MonitoredFeed>, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Config::parse(&contents)?.build_feeds(registry)
}

fn build_feed(raw: &toml::Value, registry: &SourceRegistry) -> Result<MonitoredFeed, String> {
    let feed: FeedConfig = raw
        .clone()
        .try_into()
        .map_err(|e: toml::de::Error| e.message().to_string())?;
    let threshold = Threshold::new(feed.threshold.metric, feed.threshold.amount).map_err(|e| e.to_string())?;

    if let Some(raw) = &feed.query_id {
        let entry = match raw.parse::<B256>() {
            Ok(id) => catalog::find_by_id(id),
            Err(_) => catalog::find_by_tag(raw),
        }
        .ok_or_else(|| format!("unknown query id {raw}"))?;
        if let Some(t) = &feed.query_type {
            if t != entry.query.type_name() {
                return Err(format!("query id {raw} is a {}, not {t}", entry.query.type_name()));
            }
        }
        let source = registry
            .for_query(&entry.query)
            .ok_or_else(|| format!("no trusted source for {}", entry.tag))?;
        return Ok(MonitoredFeed {
            query_id: Some(entry.query_id),
            query_type: entry.query.type_name().to_string(),
            source: Some(source),
            threshold,
        });
    }

    let type_name = feed
        .query_type
        .as_deref()
        .ok_or("needs a query_id or a query_type")?;
    if lookup(type_name).is_none() {
        return Err(format!("unknown query type {type_name}"));
    }
    if !SourceRegistry::has_template(type_name) {
        return Err(format!("no trusted source template for {type_name}"));
    }

    let Some(params) = &feed.params else {
        return Ok(MonitoredFeed {
            query_id: None,
            query_type: type_name.to_string(),
            source: None,
            threshold,
        });
    };

    let mut object = serde_json::Map::new();
    object.insert("type".to_string(), serde_json::Value::String(type_name.to_string()));
    for (name, value) in params {
        let value = serde_json::to_value(value).map_err(|e| format!("param {name}: {e}"))?;
        object.insert(name.clone(), value);
    }
    let json = serde_json::to_vec(&serde_json::Value::Object(object)).map_err(|e| e.to_string())?;
    let query = decode_query(&json).ok_or_else(|| format!("params do not fit {type_name}"))?;
    let query_data = encode_query(&query.kind).ok_or_else(|| format!("cannot encode {type_name}"))?;
    let source = registry
        .for_query(&query)
        .ok_or_else(|| format!("no trusted source for {type_name} with these params"))?;

    Ok(MonitoredFeed {
        query_id: Some(query_id(&query.kind, &query_data)),
        query_type: type_name.to_string(),
        source: Some(source),
        threshold,
    })
}
