//! Raw log events, per-unit cursors and polling units.

use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::Log;

/// What a polling unit watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// `NewReport` on the oracle contract.
    Reports,
    /// Oracle address changes on the token contract.
    OracleAddress,
}

/// One (chain, contract, topic set) to poll each cycle.
#[derive(Debug, Clone)]
pub struct PollUnit {
    pub chain_id: u64,
    pub rpc_url: String,
    pub address: Address,
    pub topics: Vec<B256>,
    pub kind: UnitKind,
}

impl PollUnit {
    pub fn key(&self) -> UnitKey {
        UnitKey {
            chain_id: self.chain_id,
            address: self.address,
            kind: self.kind,
        }
    }

    /// Endpoints still carrying a `{API_KEY}`-style template were never configured.
    pub fn has_placeholder_url(&self) -> bool {
        let url = self.rpc_url.trim();
        url.is_empty() || (url.contains('{') && url.contains('}'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub chain_id: u64,
    pub address: Address,
    pub kind: UnitKind,
}

/// Last block a unit has scanned. Monotonic; advanced only after a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainCursor {
    pub chain_id: u64,
    pub last_scanned_block: u64,
}

/// A log as returned by the node, tagged with its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogEvent {
    pub chain_id: u64,
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl RawLogEvent {
    /// Pending logs (no tx hash yet) are dropped.
    pub fn from_log(chain_id: u64, log: &Log) -> Option<Self> {
        Some(Self {
            chain_id,
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number.unwrap_or(0),
            tx_hash: log.transaction_hash?,
            log_index: log.log_index.unwrap_or(0),
        })
    }

    pub fn dedup_key(&self) -> (u64, B256, u64) {
        (self.chain_id, self.tx_hash, self.log_index)
    }
}
