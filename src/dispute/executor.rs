//! Dispute executor.
//!
//! A sequential, guarded state machine with no in-call retry:
//! enabled → monitored → balance → fee → funds → approve → beginDispute.
//! The approval receipt is awaited before `beginDispute` is sent, so the two
//! writes from the same account never race on a nonce.

use crate::dispute::fees::quote_fee;
use crate::dispute::DisputeContracts;
use crate::pipeline::report::{explorer_link, NewReport};

use alloy::primitives::{B256, U256};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum DisputeOutcome {
    /// A precondition did not hold; nothing was sent.
    Skipped(String),
    /// A read or write failed part-way.
    Aborted(String),
    Disputed {
        tx_hash: B256,
        fee: U256,
        link: String,
    },
}

impl fmt::Display for DisputeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(why) => write!(f, "skipped: {why}"),
            Self::Aborted(why) => write!(f, "aborted: {why}"),
            Self::Disputed { link, .. } => write!(f, "disputed: {link}"),
        }
    }
}

pub struct DisputeExecutor {
    enabled: bool,
    chain_id: u64,
    contracts: Option<Arc<dyn DisputeContracts>>,
    approve_multiplier: u64,
    explorer: Option<String>,
}

impl DisputeExecutor {
    pub fn new(
        enabled: bool,
        chain_id: u64,
        contracts: Option<Arc<dyn DisputeContracts>>,
        approve_multiplier: u64,
        explorer: Option<String>,
    ) -> Self {
        Self {
            enabled,
            chain_id,
            contracts,
            approve_multiplier: approve_multiplier.max(1),
            explorer,
        }
    }

    /// Executor that never sends anything.
    pub fn disabled() -> Self {
        Self::new(false, 0, None, 1, None)
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.contracts.is_some()
    }

    /// Try to dispute `report`. On success the report's status is marked.
    pub async fn dispute(&self, report: &mut NewReport, dispute_ids: &HashSet<B256>) -> DisputeOutcome {
        let contracts = match (&self.contracts, self.enabled) {
            (Some(c), true) => c.as_ref(),
            _ => return DisputeOutcome::Skipped("disputing disabled or no account".to_string()),
        };

        if report.chain_id != self.chain_id {
            return DisputeOutcome::Skipped(format!(
                "report on chain {}, disputer on chain {}",
                report.chain_id, self.chain_id
            ));
        }

        if !dispute_ids.contains(&report.query_id) {
            info!(query_id = %report.query_id, "found disputable value outside monitored feeds");
            return DisputeOutcome::Skipped("outside monitored feeds".to_string());
        }

        let account = contracts.account();
        let balance = match contracts.token_balance(account).await {
            Ok(b) => b,
            Err(e) => return abort("balance", e),
        };

        let quote = match quote_fee(contracts, report.query_id, report.submission_timestamp).await {
            Ok(q) => q,
            Err(e) => return abort("fee quote", e),
        };

        if balance < quote.final_fee {
            warn!(
                account = %account,
                balance = %balance,
                fee = %quote.final_fee,
                "need more tokens to dispute"
            );
            return DisputeOutcome::Skipped("need more tokens".to_string());
        }

        let allowance = quote
            .final_fee
            .saturating_mul(U256::from(self.approve_multiplier));
        let governance = contracts.governance();
        match contracts.approve(governance, allowance).await {
            Ok(tx) => info!(tx = %tx, amount = %allowance, "approved governance spend"),
            Err(e) => return abort("approve", e),
        }

        let tx_hash = match contracts
            .begin_dispute(report.query_id, report.submission_timestamp)
            .await
        {
            Ok(tx) => tx,
            Err(e) => return abort("beginDispute", e),
        };

        report.mark_disputed();
        let link = explorer_link(self.explorer.as_deref(), self.chain_id, &tx_hash);
        info!(
            query_id = %report.query_id,
            timestamp = report.submission_timestamp,
            fee = %quote.final_fee,
            link = %link,
            "dispute submitted"
        );
        DisputeOutcome::Disputed {
            tx_hash,
            fee: quote.final_fee,
            link,
        }
    }
}

fn abort(step: &str, e: impl fmt::Display) -> DisputeOutcome {
    error!(step, error = %e, "dispute aborted");
    DisputeOutcome::Aborted(format!("{step}: {e}"))
}
