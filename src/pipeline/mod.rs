//! Per-cycle driver: poll, dedup, process, alert, dispute.

pub mod processor;
pub mod report;
pub mod sink;

pub use processor::{Clocks, ProcessedReport, ProcessorSettings, ReportProcessor};
pub use report::{NewReport, ReportRow};
pub use sink::ReportSink;

use crate::dispute::{DisputeExecutor, DisputeOutcome};
use crate::feeds::{BindingOrigin, MonitoredFeed};
use crate::onchain::{gather, BoundUnit, LogPoller, RawLogEvent, SeenReports, UnitKind};
use crate::pipeline::report::{explorer_link, ALWAYS_ALERT_BANNER};

use alloy::primitives::B256;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DISPUTABLE_ALERT: &str = "❗DISPUTABLE VALUE❗";
pub const NEW_VALUE_ALERT: &str = "❗NEW VALUE❗";
pub const ORACLE_ADDRESS_ALERT: &str = "❗NEW ORACLE ADDRESS ALERT❗";

/// Everything the monitor hands to the outside world.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Alert { message: String, link: String },
    Row(ReportRow),
    Disputed {
        query_id: B256,
        tx_hash: B256,
        link: String,
    },
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alert { message, .. } => write!(f, "{message}"),
            Self::Row(row) => write!(
                f,
                "{} | {} | {} {}/{} | {} | {}",
                row.tx_hash, row.query_type, row.value, row.asset, row.currency, row.status, row.link
            ),
            Self::Disputed { query_id, link, .. } => write!(f, "disputed {query_id}: {link}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub events: usize,
    pub duplicates: usize,
    pub reports: usize,
    pub alerts: usize,
    pub disputes: usize,
}

pub struct Monitor {
    poller: LogPoller,
    units: Vec<BoundUnit>,
    rpc_timeout: Option<Duration>,
    seen: SeenReports,
    processor: ReportProcessor,
    executor: DisputeExecutor,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl Monitor {
    pub fn new(
        poller: LogPoller,
        units: Vec<BoundUnit>,
        rpc_timeout: Option<Duration>,
        dedup_capacity: usize,
        processor: ReportProcessor,
        executor: DisputeExecutor,
        events: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Self {
        Self {
            poller,
            units,
            rpc_timeout,
            seen: SeenReports::new(dedup_capacity),
            processor,
            executor,
            events,
        }
    }

    /// One polling cycle over every unit, judged against `feeds`.
    pub async fn run_cycle(&mut self, feeds: &[MonitoredFeed]) -> CycleStats {
        let batches = gather(&mut self.poller, &self.units, self.rpc_timeout).await;
        let configured: HashSet<B256> = feeds.iter().filter_map(|f| f.query_id).collect();
        let mut stats = CycleStats::default();

        for (unit, events) in batches {
            for event in events {
                stats.events += 1;
                if !self.seen.insert(event.tx_hash) {
                    stats.duplicates += 1;
                    continue;
                }
                match unit.kind {
                    UnitKind::OracleAddress => {
                        let link = explorer_link(
                            self.processor.explorer(event.chain_id),
                            event.chain_id,
                            &event.tx_hash,
                        );
                        warn!(chain_id = event.chain_id, link = %link, "oracle address event");
                        self.alert(ORACLE_ADDRESS_ALERT, link);
                        stats.alerts += 1;
                    }
                    UnitKind::Reports => {
                        self.handle_report(&event, feeds, &configured, &mut stats).await;
                    }
                }
            }
        }

        if stats.events > 0 {
            info!(
                events = stats.events,
                duplicates = stats.duplicates,
                reports = stats.reports,
                alerts = stats.alerts,
                disputes = stats.disputes,
                "cycle complete"
            );
        }
        stats
    }

    async fn handle_report(
        &mut self,
        event: &RawLogEvent,
        feeds: &[MonitoredFeed],
        configured: &HashSet<B256>,
        stats: &mut CycleStats,
    ) {
        let Some(ProcessedReport { mut report, origin }) = self.processor.process(event, feeds).await else {
            return;
        };
        stats.reports += 1;

        let banner = if report.always_alert {
            Some(ALWAYS_ALERT_BANNER)
        } else if report.disputable == Some(true) {
            Some(DISPUTABLE_ALERT)
        } else if self.processor.settings().see_all_values {
            Some(NEW_VALUE_ALERT)
        } else {
            None
        };
        if let Some(banner) = banner {
            self.alert(banner, report.link.clone());
            stats.alerts += 1;
        }

        if report.disputable == Some(true) && self.executor.is_active() {
            match origin {
                Some(BindingOrigin::QueryId) | Some(BindingOrigin::QueryType) => {
                    let mut ids = configured.clone();
                    if origin == Some(BindingOrigin::QueryType) {
                        ids.insert(report.query_id);
                    }
                    match self.executor.dispute(&mut report, &ids).await {
                        DisputeOutcome::Disputed { tx_hash, link, .. } => {
                            stats.disputes += 1;
                            self.send(MonitorEvent::Disputed {
                                query_id: report.query_id,
                                tx_hash,
                                link,
                            });
                        }
                        other => debug!(query_id = %report.query_id, outcome = %other, "no dispute"),
                    }
                }
                _ => info!(query_id = %report.query_id, "disputable value on alert-only feed"),
            }
        }

        self.send(MonitorEvent::Row(ReportRow::from(&report)));
    }

    fn alert(&self, banner: &str, link: String) {
        self.send(MonitorEvent::Alert {
            message: format!("{banner}\n{link}"),
            link,
        });
    }

    fn send(&self, event: MonitorEvent) {
        if self.events.send(event).is_err() {
            warn!("monitor event receiver dropped");
        }
    }
}
