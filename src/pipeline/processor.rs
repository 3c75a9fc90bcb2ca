//! Turns one raw `NewReport` log into a judged [`NewReport`].

use crate::evaluator::evaluate;
use crate::feeds::{match_feed, BindingOrigin, MatchOutcome, MonitoredFeed, SourceRegistry};
use crate::onchain::abi::ITellorOracle;
use crate::onchain::blocks::BlockClock;
use crate::onchain::RawLogEvent;
use crate::pipeline::report::{explorer_link, NewReport};
use crate::query::{decode_query, decode_value, QueryKind};

use alloy::sol_types::SolEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Per-chain block clocks for call-type reports.
pub trait Clocks: Send + Sync {
    fn clock_for(&self, chain_id: u64) -> Option<Arc<dyn BlockClock>>;
}

impl Clocks for SourceRegistry {
    fn clock_for(&self, chain_id: u64) -> Option<Arc<dyn BlockClock>> {
        match self.clock(chain_id) {
            Ok(c) => Some(c as Arc<dyn BlockClock>),
            Err(e) => {
                error!(chain_id, error = %e, "no block clock");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessorSettings {
    pub confidence_threshold: f64,
    pub see_all_values: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessedReport {
    pub report: NewReport,
    /// How the report was bound; `None` for always-alert submissions.
    pub origin: Option<BindingOrigin>,
}

pub struct ReportProcessor {
    registry: Arc<SourceRegistry>,
    clocks: Arc<dyn Clocks>,
    explorers: HashMap<u64, String>,
    settings: ProcessorSettings,
}

impl ReportProcessor {
    pub fn new(
        registry: Arc<SourceRegistry>,
        clocks: Arc<dyn Clocks>,
        explorers: HashMap<u64, String>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            registry,
            clocks,
            explorers,
            settings,
        }
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.settings
    }

    pub fn explorer(&self, chain_id: u64) -> Option<&str> {
        self.explorers.get(&chain_id).map(String::as_str)
    }

    /// `None` when the report is dropped: undecodable, unmatched, or
    /// undecidable while not showing all values.
    pub async fn process(&self, event: &RawLogEvent, feeds: &[MonitoredFeed]) -> Option<ProcessedReport> {
        let log = match ITellorOracle::NewReport::decode_raw_log(event.topics.iter().copied(), &event.data) {
            Ok(log) => log,
            Err(e) => {
                error!(chain_id = event.chain_id, tx = %event.tx_hash, error = %e, "unable to decode NewReport log");
                return None;
            }
        };

        let Some(query) = decode_query(&log._queryData) else {
            error!(chain_id = event.chain_id, tx = %event.tx_hash, "unable to form query from query data");
            return None;
        };

        let Ok(submission_timestamp) = u64::try_from(log._time) else {
            error!(tx = %event.tx_hash, time = %log._time, "report timestamp out of range");
            return None;
        };

        let decoded = decode_value(&query, &log._value);
        let (asset, currency) = query.asset_pair().unwrap_or_default();
        let mut report = NewReport {
            tx_hash: event.tx_hash,
            chain_id: event.chain_id,
            query_id: log._queryId,
            query_type: query.type_name().to_string(),
            value: Some(decoded.value),
            value_warning: decoded.warning,
            submission_timestamp,
            asset,
            currency,
            disputable: None,
            always_alert: false,
            status_text: String::new(),
            link: explorer_link(self.explorer(event.chain_id), event.chain_id, &event.tx_hash),
        };

        let binding = match match_feed(
            report.query_id,
            &query,
            feeds,
            &self.registry,
            self.settings.confidence_threshold,
        ) {
            MatchOutcome::AlwaysAlert => {
                info!(query_type = %report.query_type, tx = %report.tx_hash, "always-alert submission");
                report.mark_always_alert();
                return Some(ProcessedReport { report, origin: None });
            }
            MatchOutcome::Unmatched => {
                info!(query_id = %report.query_id, "skipping undesired NewReport event");
                return None;
            }
            MatchOutcome::Bound(b) => b,
        };

        let clock = match &query.kind {
            QueryKind::EvmCall { chain_id, .. } => self.clocks.clock_for(*chain_id),
            _ => None,
        };
        let disputable = evaluate(
            &binding.threshold,
            binding.source.as_ref(),
            report.value.as_ref(),
            query.capabilities.is_call,
            clock.as_deref(),
        )
        .await;

        if disputable.is_none() && !self.settings.see_all_values {
            info!(query_id = %report.query_id, "unable to check disputability");
            return None;
        }
        report.settle(disputable);
        debug!(
            query_id = %report.query_id,
            status = %report.status_text,
            origin = ?binding.origin,
            "report evaluated"
        );
        Some(ProcessedReport {
            report,
            origin: Some(binding.origin),
        })
    }
}
