//! Historical block-timestamp locator.
//!
//! Maps a UNIX timestamp to the block that was current at that time: binary
//! search over `[0, latest]`, then linear interpolation between the two
//! bracketing blocks when no block carries the exact timestamp.

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{DynProvider, Provider};
use alloy::transports::RpcError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BlockLookupError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("block {0} not found")]
    MissingBlock(u64),
    #[error("could not decode block {number}: {reason}")]
    Decode { number: u64, reason: String },
}

/// Reads block heights and timestamps.
#[async_trait]
pub trait BlockClock: Send + Sync {
    async fn latest_block(&self) -> Result<u64, BlockLookupError>;
    async fn block_timestamp(&self, number: u64) -> Result<u64, BlockLookupError>;
}

/// [`BlockClock`] over JSON-RPC.
///
/// Some chains return blocks the typed decoder rejects (extra or oddly
/// encoded header fields). The first such failure switches the endpoint to
/// an untyped read of `timestamp` only, and it stays switched.
pub struct RpcBlockClock {
    chain_id: u64,
    provider: DynProvider,
    compat_shim: AtomicBool,
}

impl RpcBlockClock {
    pub fn new(chain_id: u64, provider: DynProvider) -> Self {
        Self {
            chain_id,
            provider,
            compat_shim: AtomicBool::new(false),
        }
    }

    pub fn shim_enabled(&self) -> bool {
        self.compat_shim.load(Ordering::Relaxed)
    }

    async fn typed_timestamp(&self, number: u64) -> Result<u64, BlockLookupError> {
        match self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
        {
            Ok(Some(block)) => Ok(block.header.timestamp),
            Ok(None) => Err(BlockLookupError::MissingBlock(number)),
            Err(RpcError::DeserError { err, .. }) => Err(BlockLookupError::Decode {
                number,
                reason: err.to_string(),
            }),
            Err(e) => Err(BlockLookupError::Rpc(e.to_string())),
        }
    }

    async fn untyped_timestamp(&self, number: u64) -> Result<u64, BlockLookupError> {
        let block: Value = self
            .provider
            .raw_request(
                "eth_getBlockByNumber".into(),
                (BlockNumberOrTag::Number(number), false),
            )
            .await
            .map_err(|e| BlockLookupError::Rpc(e.to_string()))?;
        if block.is_null() {
            return Err(BlockLookupError::MissingBlock(number));
        }
        parse_timestamp(&block).ok_or_else(|| BlockLookupError::Decode {
            number,
            reason: "missing or malformed timestamp".to_string(),
        })
    }
}

fn parse_timestamp(block: &Value) -> Option<u64> {
    match block.get("timestamp")? {
        Value::String(s) => {
            let hex = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(hex, 16).ok()
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[async_trait]
impl BlockClock for RpcBlockClock {
    async fn latest_block(&self) -> Result<u64, BlockLookupError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| BlockLookupError::Rpc(e.to_string()))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, BlockLookupError> {
        if self.shim_enabled() {
            return self.untyped_timestamp(number).await;
        }
        match self.typed_timestamp(number).await {
            Err(BlockLookupError::Decode { reason, .. }) => {
                info!(chain_id = self.chain_id, %reason, "enabling block compatibility shim");
                self.compat_shim.store(true, Ordering::Relaxed);
                self.untyped_timestamp(number).await
            }
            other => other,
        }
    }
}

/// Memoizes timestamps for the duration of one search.
struct Probe<'a> {
    clock: &'a dyn BlockClock,
    seen: HashMap<u64, u64>,
}

impl Probe<'_> {
    async fn at(&mut self, number: u64) -> Result<u64, BlockLookupError> {
        if let Some(ts) = self.seen.get(&number) {
            return Ok(*ts);
        }
        let ts = self.clock.block_timestamp(number).await?;
        self.seen.insert(number, ts);
        Ok(ts)
    }
}

/// Block number whose timestamp is `target_ts`, or the closest estimate.
pub async fn find_block(clock: &dyn BlockClock, target_ts: u64) -> Result<u64, BlockLookupError> {
    let latest = clock.latest_block().await?;
    let mut probe = Probe {
        clock,
        seen: HashMap::new(),
    };

    if target_ts >= probe.at(latest).await? {
        return Ok(latest);
    }
    if target_ts <= probe.at(0).await? {
        return Ok(0);
    }

    // Invariant: ts(lo) < target < ts(hi).
    let (mut lo, mut hi) = (0u64, latest);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let ts = probe.at(mid).await?;
        if ts == target_ts {
            debug!(block = mid, target_ts, probes = probe.seen.len(), "exact block found");
            return Ok(mid);
        }
        if ts < target_ts {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let (lo_ts, hi_ts) = (probe.at(lo).await?, probe.at(hi).await?);
    if hi_ts <= lo_ts {
        warn!(lo, hi, "non-increasing block timestamps, using lower block");
        return Ok(lo);
    }
    let fraction = (target_ts - lo_ts) as f64 / (hi_ts - lo_ts) as f64;
    let estimate = lo + ((hi - lo) as f64 * fraction).round() as u64;
    debug!(block = estimate, target_ts, "interpolated block");
    Ok(estimate)
}
