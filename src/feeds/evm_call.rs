//! `eth_call` against a contract, optionally at a historical block.

use crate::feeds::{SourceError, TrustedValueSource};
use crate::query::ReportValue;

use alloy::eips::BlockId;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

pub struct EvmCallSource {
    chain_id: u64,
    contract: Address,
    calldata: Bytes,
    provider: DynProvider,
}

impl EvmCallSource {
    pub fn new(chain_id: u64, contract: Address, calldata: Bytes, provider: DynProvider) -> Self {
        Self {
            chain_id,
            contract,
            calldata,
            provider,
        }
    }
}

#[async_trait]
impl TrustedValueSource for EvmCallSource {
    fn describe(&self) -> String {
        format!("eth_call {} on chain {}", self.contract, self.chain_id)
    }

    async fn fetch(&self, at_block: Option<u64>) -> Result<ReportValue, SourceError> {
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(self.calldata.clone());
        let block = at_block.map(BlockId::number).unwrap_or_else(BlockId::latest);
        let out = self
            .provider
            .call(tx)
            .block(block)
            .await
            .map_err(|e| SourceError::Rpc(e.to_string()))?;
        Ok(ReportValue::Bytes(out))
    }
}
