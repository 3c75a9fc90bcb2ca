//! Processed reports, their status strings and persisted rows.

use crate::query::ReportValue;

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

pub const ALWAYS_ALERT_BANNER: &str = "❗❗❗❗ VERY IMPORTANT DATA SUBMISSION ❗❗❗❗";
pub const DISPUTED_MARKER: &str = " ⚔ disputed";

/// One processed `NewReport` log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub tx_hash: B256,
    pub chain_id: u64,
    pub query_id: B256,
    pub query_type: String,
    pub value: Option<ReportValue>,
    /// Set when the value bytes did not fit the query's codec.
    pub value_warning: Option<String>,
    /// `_time` of the event, not the time we saw it.
    pub submission_timestamp: u64,
    pub asset: String,
    pub currency: String,
    pub disputable: Option<bool>,
    pub always_alert: bool,
    pub status_text: String,
    pub link: String,
}

impl NewReport {
    /// Record the evaluator's verdict. Only the first call has an effect.
    pub fn settle(&mut self, disputable: Option<bool>) {
        if !self.status_text.is_empty() {
            return;
        }
        self.disputable = disputable;
        self.status_text = status_text(disputable, &self.query_id);
    }

    pub fn mark_always_alert(&mut self) {
        self.always_alert = true;
        self.status_text = ALWAYS_ALERT_BANNER.to_string();
    }

    pub fn mark_disputed(&mut self) {
        if !self.status_text.ends_with(DISPUTED_MARKER) {
            self.status_text.push_str(DISPUTED_MARKER);
        }
    }
}

pub fn status_text(disputable: Option<bool>, query_id: &B256) -> String {
    match disputable {
        Some(true) => "yes ❗".to_string(),
        Some(false) => "no ✔".to_string(),
        None => format!("unsupported query ID: {query_id}"),
    }
}

pub fn explorer_link(explorer: Option<&str>, chain_id: u64, tx_hash: &B256) -> String {
    match explorer {
        Some(base) if !base.is_empty() => format!("{}/tx/{tx_hash}", base.trim_end_matches('/')),
        _ => format!("Explorer not defined for chain_id {chain_id}"),
    }
}

/// Shorten a value for display: floats to four places, long text to `first6...last5`.
pub fn shorten_value(value: &ReportValue) -> String {
    if let ReportValue::Numeric(v) = value {
        if let Some(mut d) = Decimal::from_f64(*v) {
            d.rescale(4);
            return d.to_string();
        }
    }
    let s = value.to_string();
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}...{tail}")
    } else {
        s
    }
}

/// One persisted line per displayed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub tx_hash: String,
    pub timestamp: u64,
    pub when: Option<DateTime<Utc>>,
    pub query_type: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub status: String,
    pub asset: String,
    pub currency: String,
    pub chain_id: u64,
    pub link: String,
}

impl From<&NewReport> for ReportRow {
    fn from(r: &NewReport) -> Self {
        Self {
            tx_hash: r.tx_hash.to_string(),
            timestamp: r.submission_timestamp,
            when: i64::try_from(r.submission_timestamp)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            query_type: r.query_type.clone(),
            value: r.value.as_ref().map(shorten_value).unwrap_or_default(),
            warning: r.value_warning.clone(),
            status: r.status_text.clone(),
            asset: r.asset.clone(),
            currency: r.currency.clone(),
            chain_id: r.chain_id,
            link: r.link.clone(),
        }
    }
}
