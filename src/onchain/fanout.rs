//! Concurrent polling across chains and topic sets.
//!
//! Every unit runs as its own future with its cursor moved in; all of them
//! are awaited together and the cursors are returned to the poller at the
//! end. A slow or broken endpoint only ever empties its own batch.

use crate::onchain::monitor::{poll_unit, LogPoller, LogSource, PollOutcome};
use crate::onchain::types::{PollUnit, RawLogEvent};

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A unit paired with the endpoint that serves it.
#[derive(Clone)]
pub struct BoundUnit {
    pub unit: PollUnit,
    pub source: Arc<dyn LogSource>,
}

/// Poll every unit concurrently, one batch per dispatched unit.
pub async fn gather(
    poller: &mut LogPoller,
    units: &[BoundUnit],
    rpc_timeout: Option<Duration>,
) -> Vec<(PollUnit, Vec<RawLogEvent>)> {
    let settings = poller.settings();

    let tasks: Vec<_> = units
        .iter()
        .filter(|b| {
            if b.unit.has_placeholder_url() {
                debug!(chain_id = b.unit.chain_id, "skipping endpoint without a configured url");
                false
            } else {
                true
            }
        })
        .map(|b| {
            let key = b.unit.key();
            let cursor = poller.take_cursor(&key);
            let bound = b.clone();
            async move {
                let fetch = poll_unit(bound.source.as_ref(), &bound.unit, cursor, settings);
                let outcome = match rpc_timeout {
                    Some(limit) => match tokio::time::timeout(limit, fetch).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                chain_id = bound.unit.chain_id,
                                timeout_secs = limit.as_secs(),
                                "polling unit timed out"
                            );
                            PollOutcome {
                                cursor,
                                events: Vec::new(),
                            }
                        }
                    },
                    None => fetch.await,
                };
                (key, bound.unit, outcome)
            }
        })
        .collect();

    join_all(tasks)
        .await
        .into_iter()
        .map(|(key, unit, outcome)| {
            poller.return_cursor(key, outcome.cursor);
            (unit, outcome.events)
        })
        .collect()
}
