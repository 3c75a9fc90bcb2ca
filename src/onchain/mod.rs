//! On-chain event ingestion for oracle networks.
//!
//! Polls `eth_getLogs` on every configured chain for:
//! 1. `NewReport` on the oracle contract (value submissions)
//! 2. `NewOracleAddress` / `NewProposedOracleAddress` on the token contract
//!
//! Architecture:
//! - `LogPoller`: owns one cursor per polling unit, windowed and reorg-tolerant
//! - `fanout::gather`: runs every unit concurrently with per-unit isolation
//! - `blocks::find_block`: maps a report timestamp back to a block height
//! - `SeenReports`: rolling tx-hash dedup across cycles

pub mod abi;
pub mod blocks;
pub mod cache;
pub mod fanout;
pub mod monitor;
pub mod types;

pub use blocks::{find_block, BlockClock, BlockLookupError, RpcBlockClock};
pub use cache::SeenReports;
pub use fanout::{gather, BoundUnit};
pub use monitor::{LogPoller, LogSource, PollError, PollSettings, RpcLogSource};
pub use types::{ChainCursor, PollUnit, RawLogEvent, UnitKey, UnitKind};
