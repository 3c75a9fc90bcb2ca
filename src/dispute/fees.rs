//! Escalating dispute fee.
//!
//! Every prior vote round on the same report doubles the fee; on the first
//! round, every other open dispute on the query id does. The fee never
//! exceeds the stake amount.

use crate::dispute::{DisputeContracts, DisputeError};
use crate::onchain::abi::dispute_hash;

use alloy::primitives::{B256, U256};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisputeFeeQuote {
    pub base_fee: U256,
    pub escalation_multiplier: u64,
    pub stake_cap: U256,
    pub final_fee: U256,
}

/// `min(base * 2^multiplier, stake)`, saturating to `stake` on overflow.
pub fn escalate(base_fee: U256, multiplier: u64, stake_cap: U256) -> U256 {
    let factor = u32::try_from(multiplier)
        .ok()
        .and_then(|m| U256::from(2u8).checked_pow(U256::from(m)));
    match factor.and_then(|f| base_fee.checked_mul(f)) {
        Some(fee) => fee.min(stake_cap),
        None => stake_cap,
    }
}

/// Quote the fee for disputing the report `(query_id, timestamp)`.
/// Any failed read aborts the quote.
pub async fn quote_fee(
    contracts: &dyn DisputeContracts,
    query_id: B256,
    timestamp: u64,
) -> Result<DisputeFeeQuote, DisputeError> {
    let base_fee = contracts.dispute_fee().await?;
    let rounds = contracts.vote_rounds(dispute_hash(query_id, timestamp)).await?.len() as u64;

    let escalation_multiplier = if rounds == 1 {
        let open = contracts.open_disputes_on_id(query_id).await?;
        u64::try_from(open).unwrap_or(u64::MAX).saturating_sub(1)
    } else {
        rounds.saturating_sub(1)
    };

    let stake_cap = contracts.stake_amount().await?;
    let final_fee = escalate(base_fee, escalation_multiplier, stake_cap);
    debug!(
        query_id = %query_id,
        base_fee = %base_fee,
        rounds,
        multiplier = escalation_multiplier,
        final_fee = %final_fee,
        "dispute fee quoted"
    );

    Ok(DisputeFeeQuote {
        base_fee,
        escalation_multiplier,
        stake_cap,
        final_fee,
    })
}
