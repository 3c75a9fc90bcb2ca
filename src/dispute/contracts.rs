//! [`DisputeContracts`] over alloy contract bindings with a local signer.

use crate::dispute::{DisputeContracts, DisputeError};
use crate::onchain::abi::{IGovernance, ITellorOracle, ITellorToken};

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::info;

pub struct AlloyDisputeContracts {
    account: Address,
    oracle: ITellorOracle::ITellorOracleInstance<DynProvider>,
    token: ITellorToken::ITellorTokenInstance<DynProvider>,
    governance: IGovernance::IGovernanceInstance<DynProvider>,
}

impl AlloyDisputeContracts {
    pub fn connect(
        rpc_url: &str,
        private_key: &str,
        oracle: Address,
        token: Address,
        governance: Address,
    ) -> Result<Self, DisputeError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| DisputeError::Signer(format!("{e}")))?;
        let account = signer.address();
        let url = rpc_url
            .parse()
            .map_err(|e| DisputeError::Endpoint(format!("{rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().wallet(signer).connect_http(url).erased();
        info!(account = %account, governance = %governance, "dispute account loaded");

        Ok(Self {
            account,
            oracle: ITellorOracle::new(oracle, provider.clone()),
            token: ITellorToken::new(token, provider.clone()),
            governance: IGovernance::new(governance, provider),
        })
    }
}

fn read_err(what: &'static str) -> impl FnOnce(alloy::contract::Error) -> DisputeError {
    move |e| DisputeError::Read {
        what,
        reason: e.to_string(),
    }
}

#[async_trait]
impl DisputeContracts for AlloyDisputeContracts {
    fn account(&self) -> Address {
        self.account
    }

    fn governance(&self) -> Address {
        *self.governance.address()
    }

    async fn dispute_fee(&self) -> Result<U256, DisputeError> {
        self.governance
            .getDisputeFee()
            .call()
            .await
            .map_err(read_err("dispute fee"))
    }

    async fn vote_rounds(&self, dispute_hash: B256) -> Result<Vec<U256>, DisputeError> {
        self.governance
            .getVoteRounds(dispute_hash)
            .call()
            .await
            .map_err(read_err("vote rounds"))
    }

    async fn open_disputes_on_id(&self, query_id: B256) -> Result<U256, DisputeError> {
        self.governance
            .getOpenDisputesOnId(query_id)
            .call()
            .await
            .map_err(read_err("open disputes"))
    }

    async fn stake_amount(&self) -> Result<U256, DisputeError> {
        self.oracle
            .getStakeAmount()
            .call()
            .await
            .map_err(read_err("stake amount"))
    }

    async fn token_balance(&self, account: Address) -> Result<U256, DisputeError> {
        self.token
            .balanceOf(account)
            .call()
            .await
            .map_err(read_err("token balance"))
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<B256, DisputeError> {
        let reverted = |reason: String| DisputeError::Reverted {
            step: "approve",
            reason,
        };
        let receipt = self
            .token
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| reverted(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| reverted(e.to_string()))?;
        if !receipt.status() {
            return Err(reverted(format!("tx {} failed", receipt.transaction_hash)));
        }
        Ok(receipt.transaction_hash)
    }

    async fn begin_dispute(&self, query_id: B256, timestamp: u64) -> Result<B256, DisputeError> {
        let reverted = |reason: String| DisputeError::Reverted {
            step: "beginDispute",
            reason,
        };
        let receipt = self
            .governance
            .beginDispute(query_id, U256::from(timestamp))
            .send()
            .await
            .map_err(|e| reverted(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| reverted(e.to_string()))?;
        if !receipt.status() {
            return Err(reverted(format!("tx {} failed", receipt.transaction_hash)));
        }
        Ok(receipt.transaction_hash)
    }
}
