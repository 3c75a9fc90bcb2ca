//! Oracle dispute monitor.
//!
//! Watches `NewReport` submissions across EVM chains, compares each reported
//! value against a trusted one and, when enabled, opens on-chain disputes
//! against values outside the configured tolerance.

pub mod config;
pub mod dispute;
pub mod evaluator;
pub mod feeds;
pub mod onchain;
pub mod pipeline;
pub mod query;
