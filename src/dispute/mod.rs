//! On-chain disputes: fee quoting and the dispute state machine.

pub mod contracts;
pub mod executor;
pub mod fees;

pub use contracts::AlloyDisputeContracts;
pub use executor::{DisputeExecutor, DisputeOutcome};
pub use fees::{quote_fee, DisputeFeeQuote};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("failed to read {what}: {reason}")]
    Read { what: &'static str, reason: String },
    #[error("{step} reverted: {reason}")]
    Reverted { step: &'static str, reason: String },
    #[error("invalid signer: {0}")]
    Signer(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// The oracle, token and governance calls a dispute needs.
#[async_trait]
pub trait DisputeContracts: Send + Sync {
    /// The disputing account.
    fn account(&self) -> Address;
    fn governance(&self) -> Address;

    async fn dispute_fee(&self) -> Result<U256, DisputeError>;
    /// Dispute ids recorded for `keccak256(abi.encodePacked(queryId, timestamp))`.
    async fn vote_rounds(&self, dispute_hash: B256) -> Result<Vec<U256>, DisputeError>;
    async fn open_disputes_on_id(&self, query_id: B256) -> Result<U256, DisputeError>;
    async fn stake_amount(&self) -> Result<U256, DisputeError>;
    async fn token_balance(&self, account: Address) -> Result<U256, DisputeError>;

    /// Send `approve` and wait for its receipt.
    async fn approve(&self, spender: Address, amount: U256) -> Result<B256, DisputeError>;
    /// Send `beginDispute` and wait for its receipt.
    async fn begin_dispute(&self, query_id: B256, timestamp: u64) -> Result<B256, DisputeError>;
}
