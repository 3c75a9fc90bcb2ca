//! Trusted-value sources and monitored feeds.
//!
//! A trusted-value source supplies the reference a report is compared with,
//! optionally as of a historical block. Sources are built from a decoded
//! query by the [`sources::SourceRegistry`]; the [`catalog`] names well-known
//! feeds; the [`matcher`] binds a report to the feed that judges it.

pub mod aggregator;
pub mod api;
pub mod binance;
pub mod catalog;
pub mod coinbase;
pub mod evm_call;
pub mod matcher;
pub mod sources;

use crate::evaluator::Threshold;
use crate::query::ReportValue;

use alloy::primitives::B256;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use matcher::{match_feed, Binding, BindingOrigin, MatchOutcome};
pub use sources::SourceRegistry;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("no price available for {0}")]
    NoPrice(String),
    #[error("no endpoint configured for chain {0}")]
    NoEndpoint(u64),
}

/// Supplies the reference value for one query.
#[async_trait]
pub trait TrustedValueSource: Send + Sync {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    /// Current value, or the value as of `at_block` where the source supports it.
    async fn fetch(&self, at_block: Option<u64>) -> Result<ReportValue, SourceError>;
}

/// An operator-configured (query, trusted source, threshold) tuple.
///
/// A feed with a `query_id` judges exactly that query. A type-only feed
/// (`query_id` and `source` both absent) judges every query of its type,
/// with a source rebuilt from each report's parameters.
#[derive(Clone)]
pub struct MonitoredFeed {
    pub query_id: Option<B256>,
    pub query_type: String,
    pub source: Option<Arc<dyn TrustedValueSource>>,
    pub threshold: Threshold,
}

impl MonitoredFeed {
    pub fn is_type_only(&self) -> bool {
        self.query_id.is_none()
    }
}

impl fmt::Debug for MonitoredFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredFeed")
            .field("query_id", &self.query_id)
            .field("query_type", &self.query_type)
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .field("threshold", &self.threshold)
            .finish()
    }
}
