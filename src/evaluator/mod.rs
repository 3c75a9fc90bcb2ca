//! Disputability evaluation.
//!
//! Compares a reported value against a trusted one under a [`Threshold`].
//! The answer is tri-state: `Some(true)` disputable, `Some(false)` fine,
//! `None` undecidable (logged, never an error).

use crate::feeds::TrustedValueSource;
use crate::onchain::blocks::{find_block, BlockClock};
use crate::query::ReportValue;

use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Percentage,
    Range,
    Equality,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Percentage => write!(f, "percentage"),
            Metric::Range => write!(f, "range"),
            Metric::Equality => write!(f, "equality"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("{0} threshold needs an amount")]
    MissingAmount(Metric),
    #[error("{metric} threshold amount cannot be negative (got {amount})")]
    NegativeAmount { metric: Metric, amount: f64 },
}

/// Tolerated difference between a reported and a trusted value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    metric: Metric,
    amount: Option<f64>,
}

impl Threshold {
    /// Equality ignores `amount`; the other metrics require a non-negative one.
    pub fn new(metric: Metric, amount: Option<f64>) -> Result<Self, ThresholdError> {
        match (metric, amount) {
            (Metric::Equality, amount) => {
                if amount.is_some() {
                    debug!("equality threshold selected, ignoring amount");
                }
                Ok(Self {
                    metric,
                    amount: None,
                })
            }
            (_, None) => Err(ThresholdError::MissingAmount(metric)),
            (_, Some(a)) if a < 0.0 || a.is_nan() => {
                Err(ThresholdError::NegativeAmount { metric, amount: a })
            }
            (_, Some(a)) => Ok(Self {
                metric,
                amount: Some(a),
            }),
        }
    }

    pub fn percentage(amount: f64) -> Result<Self, ThresholdError> {
        Self::new(Metric::Percentage, Some(amount))
    }

    pub fn equality() -> Self {
        Self {
            metric: Metric::Equality,
            amount: None,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn amount(&self) -> Option<f64> {
        self.amount
    }
}

/// Compare `reported` with `trusted` under `threshold`.
pub fn is_disputable(
    threshold: &Threshold,
    trusted: Option<&ReportValue>,
    reported: Option<&ReportValue>,
) -> Option<bool> {
    let Some(reported) = reported else {
        error!("need reported value to check disputability");
        return None;
    };
    let Some(trusted) = trusted else {
        warn!("no trusted value to compare against");
        return None;
    };

    match threshold.metric {
        Metric::Percentage | Metric::Range => {
            let (Some(r), Some(t)) = (reported.as_f64(), trusted.as_f64()) else {
                error!(
                    metric = %threshold.metric,
                    reported = reported.kind_name(),
                    trusted = trusted.kind_name(),
                    "cannot measure distance on non-numeric values"
                );
                return None;
            };
            let amount = threshold.amount?;
            if threshold.metric == Metric::Range {
                return Some((r - t).abs() >= amount);
            }
            if t == 0.0 {
                warn!("trusted value is zero, percentage difference undefined");
                return None;
            }
            Some(((r - t) / t).abs() >= amount)
        }
        Metric::Equality => match (reported, trusted) {
            (ReportValue::Text(r), ReportValue::Text(t)) if r.starts_with("0x") && t.starts_with("0x") => {
                Some(!r.eq_ignore_ascii_case(t))
            }
            _ => Some(reported != trusted),
        },
    }
}

/// Fetch the trusted value and evaluate a report.
///
/// Call-type reports carry `(returnData, blockTimestamp)`: the timestamp is
/// resolved to a block through `clock` and the source is read as of that
/// block before `returnData` is compared.
pub async fn evaluate(
    threshold: &Threshold,
    source: &dyn TrustedValueSource,
    reported: Option<&ReportValue>,
    is_call: bool,
    clock: Option<&dyn BlockClock>,
) -> Option<bool> {
    if !is_call {
        let trusted = fetch_logged(source, None).await;
        return is_disputable(threshold, trusted.as_ref(), reported);
    }

    let Some((data, ts)) = reported.and_then(ReportValue::call_result) else {
        error!("call-type report without (returnData, timestamp) value");
        return None;
    };
    let Some(clock) = clock else {
        error!("no block clock for call-type report");
        return None;
    };
    let block = match find_block(clock, ts).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, timestamp = ts, "could not locate block for report timestamp");
            return None;
        }
    };
    debug!(block, timestamp = ts, "reading trusted call result");
    let trusted = fetch_logged(source, Some(block)).await;
    is_disputable(threshold, trusted.as_ref(), Some(&ReportValue::Bytes(data.clone())))
}

async fn fetch_logged(source: &dyn TrustedValueSource, at_block: Option<u64>) -> Option<ReportValue> {
    match source.fetch(at_block).await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(source = %source.describe(), error = %e, "unable to fetch trusted value");
            None
        }
    }
}
