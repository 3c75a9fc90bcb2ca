//! Windowed, reorg-tolerant log poller.
//!
//! Each polling unit re-scans `reorg_margin` blocks behind its cursor every
//! cycle and never asks for more than `max_window_blocks` at once. Transient
//! RPC failures are classified, logged and turned into an empty batch; the
//! cursor only moves after a successful fetch.
//!
//! Cursors live in an explicit map owned by [`LogPoller`]. For concurrent
//! polling a cursor is taken out of the map, moved into the unit's task and
//! handed back when the task finishes.

use crate::onchain::types::{ChainCursor, PollUnit, RawLogEvent, UnitKey};

use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("unknown block: {0}")]
    UnknownBlock(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("invalid endpoint url: {0}")]
    BadEndpoint(String),
}

impl PollError {
    pub fn category(&self) -> &'static str {
        match self {
            PollError::Timeout(_) => "timeout",
            PollError::UnknownBlock(_) => "unknown_block",
            PollError::RateLimited(_) => "rate_limited",
            PollError::Rpc(_) => "rpc",
            PollError::BadEndpoint(_) => "bad_endpoint",
        }
    }
}

type Classifier = fn(String) -> PollError;

/// JSON-RPC error codes with a well-known meaning across node providers.
const RPC_CODE_TABLE: &[(i64, Classifier)] = &[
    (-32005, PollError::RateLimited),
    (-32001, PollError::UnknownBlock),
    (-32016, PollError::RateLimited),
    (429, PollError::RateLimited),
];

const HTTP_STATUS_TABLE: &[(u16, Classifier)] = &[
    (429, PollError::RateLimited),
    (408, PollError::Timeout),
    (504, PollError::Timeout),
];

/// Last resort when neither a code nor a status is available.
const MESSAGE_TABLE: &[(&str, Classifier)] = &[
    ("unknown block", PollError::UnknownBlock),
    ("header not found", PollError::UnknownBlock),
    ("timed out", PollError::Timeout),
    ("timeout", PollError::Timeout),
    ("too many requests", PollError::RateLimited),
    ("rate limit", PollError::RateLimited),
];

fn classify_message(message: String) -> PollError {
    let lower = message.to_lowercase();
    let class = MESSAGE_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, class)| *class)
        .unwrap_or(PollError::Rpc);
    class(message)
}

/// Map a transport error onto a [`PollError`] category.
pub fn classify(err: &TransportError) -> PollError {
    match err {
        RpcError::ErrorResp(payload) => RPC_CODE_TABLE
            .iter()
            .find(|(code, _)| *code == payload.code)
            .map(|(_, class)| class(payload.message.to_string()))
            .unwrap_or_else(|| classify_message(payload.message.to_string())),
        RpcError::Transport(TransportErrorKind::HttpError(http)) => HTTP_STATUS_TABLE
            .iter()
            .find(|(status, _)| *status == http.status)
            .map(|(_, class)| class(format!("HTTP {}: {}", http.status, http.body)))
            .unwrap_or_else(|| classify_message(format!("HTTP {}: {}", http.status, http.body))),
        other => classify_message(other.to_string()),
    }
}

/// One `eth_getLogs` request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub address: Address,
    pub topics: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

/// Read side of a chain endpoint as far as the poller is concerned.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64, PollError>;
    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLogEvent>, PollError>;
}

/// [`LogSource`] over an HTTP JSON-RPC provider.
pub struct RpcLogSource {
    chain_id: u64,
    provider: DynProvider,
}

impl RpcLogSource {
    pub fn connect(chain_id: u64, rpc_url: &str) -> Result<Self, PollError> {
        let url = rpc_url
            .parse()
            .map_err(|e| PollError::BadEndpoint(format!("{rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { chain_id, provider })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl LogSource for RpcLogSource {
    async fn latest_block(&self) -> Result<u64, PollError> {
        self.provider.get_block_number().await.map_err(|e| classify(&e))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLogEvent>, PollError> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.topics.clone())
            .from_block(query.from_block)
            .to_block(query.to_block);
        let logs = self.provider.get_logs(&filter).await.map_err(|e| classify(&e))?;
        Ok(logs
            .iter()
            .filter_map(|log| RawLogEvent::from_log(self.chain_id, log))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub reorg_margin: u64,
    pub initial_block_offset: u64,
    pub max_window_blocks: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            reorg_margin: 10,
            initial_block_offset: 0,
            max_window_blocks: 1000,
        }
    }
}

/// Result of polling one unit: the batch plus the cursor to hand back.
#[derive(Debug)]
pub struct PollOutcome {
    pub cursor: Option<ChainCursor>,
    pub events: Vec<RawLogEvent>,
}

/// Fetch one window of logs for `unit`, starting from `cursor`.
pub async fn poll_unit(
    source: &dyn LogSource,
    unit: &PollUnit,
    cursor: Option<ChainCursor>,
    settings: PollSettings,
) -> PollOutcome {
    let latest = match source.latest_block().await {
        Ok(n) => n,
        Err(e) => {
            log_poll_error(unit, &e);
            return PollOutcome { cursor, events: Vec::new() };
        }
    };

    let anchor = match cursor {
        Some(c) => c.last_scanned_block,
        None => {
            let seed = latest.saturating_sub(settings.initial_block_offset);
            info!(chain_id = unit.chain_id, block = seed, "seeding cursor");
            seed
        }
    };

    let from_block = anchor.saturating_sub(settings.reorg_margin).min(latest);
    let span = settings.max_window_blocks.max(settings.reorg_margin + 1);
    let to_block = latest.min(from_block.saturating_add(span - 1));
    if to_block < latest {
        debug!(
            chain_id = unit.chain_id,
            from_block,
            to_block,
            latest,
            "window capped, catching up over several cycles"
        );
    }

    let query = LogQuery {
        address: unit.address,
        topics: unit.topics.clone(),
        from_block,
        to_block,
    };

    match source.logs(&query).await {
        Ok(events) => {
            let events = dedup_batch(events);
            debug!(
                chain_id = unit.chain_id,
                from_block,
                to_block,
                events = events.len(),
                "fetched logs"
            );
            let advanced = cursor
                .map(|c| c.last_scanned_block.max(to_block))
                .unwrap_or(to_block);
            PollOutcome {
                cursor: Some(ChainCursor {
                    chain_id: unit.chain_id,
                    last_scanned_block: advanced,
                }),
                events,
            }
        }
        Err(e) => {
            log_poll_error(unit, &e);
            PollOutcome { cursor, events: Vec::new() }
        }
    }
}

fn log_poll_error(unit: &PollUnit, e: &PollError) {
    match e {
        PollError::UnknownBlock(_) => {
            info!(chain_id = unit.chain_id, "waiting for new blocks")
        }
        PollError::RateLimited(_) => {
            warn!(chain_id = unit.chain_id, error = %e, "too many requests to node")
        }
        _ => error!(
            chain_id = unit.chain_id,
            category = e.category(),
            error = %e,
            "failed to gather event logs"
        ),
    }
}

/// Drop repeated (chain, tx, log index) entries, keeping node order.
pub fn dedup_batch(events: Vec<RawLogEvent>) -> Vec<RawLogEvent> {
    let mut seen = HashSet::with_capacity(events.len());
    events.into_iter().filter(|e| seen.insert(e.dedup_key())).collect()
}

/// Owner of every unit's cursor.
#[derive(Debug, Default)]
pub struct LogPoller {
    cursors: HashMap<UnitKey, ChainCursor>,
    settings: PollSettings,
}

impl LogPoller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            cursors: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn cursor(&self, key: &UnitKey) -> Option<ChainCursor> {
        self.cursors.get(key).copied()
    }

    /// Remove a cursor so it can be moved into a polling task.
    pub fn take_cursor(&mut self, key: &UnitKey) -> Option<ChainCursor> {
        self.cursors.remove(key)
    }

    pub fn return_cursor(&mut self, key: UnitKey, cursor: Option<ChainCursor>) {
        if let Some(c) = cursor {
            self.cursors.insert(key, c);
        }
    }

    /// Poll a single unit sequentially.
    pub async fn poll(&mut self, source: &dyn LogSource, unit: &PollUnit) -> Vec<RawLogEvent> {
        let key = unit.key();
        let cursor = self.take_cursor(&key);
        let outcome = poll_unit(source, unit, cursor, self.settings).await;
        self.return_cursor(key, outcome.cursor);
        outcome.events
    }
}
