//! Type-registered trusted-source templates.
//!
//! A template turns the parameters of a decoded query into a concrete
//! [`TrustedValueSource`]. Chain providers and block clocks are created once
//! per chain and shared.

use crate::feeds::aggregator::SpotPriceSource;
use crate::feeds::api::NumericApiSource;
use crate::feeds::evm_call::EvmCallSource;
use crate::feeds::{SourceError, TrustedValueSource};
use crate::onchain::blocks::RpcBlockClock;
use crate::query::{decode_query, DecodedQuery, QueryKind};

use alloy::dyn_abi::DynSolValue;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use dashmap::DashMap;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Template = fn(&SourceRegistry, &DecodedQuery) -> Result<Arc<dyn TrustedValueSource>, SourceError>;

static TEMPLATES: &[(&str, Template)] = &[
    ("SpotPrice", spot_price),
    ("LegacyRequest", spot_price),
    ("EVMCall", evm_call),
    ("NumericApiResponse", numeric_api),
];

fn spot_price(reg: &SourceRegistry, q: &DecodedQuery) -> Result<Arc<dyn TrustedValueSource>, SourceError> {
    let (asset, currency) = q
        .asset_pair()
        .ok_or_else(|| SourceError::Parse(format!("{} has no asset pair", q.type_name())))?;
    Ok(Arc::new(SpotPriceSource::new(&asset, &currency, reg.client.clone())))
}

fn evm_call(reg: &SourceRegistry, q: &DecodedQuery) -> Result<Arc<dyn TrustedValueSource>, SourceError> {
    let QueryKind::EvmCall {
        chain_id,
        contract,
        calldata,
    } = &q.kind
    else {
        return Err(SourceError::Parse("not an EVMCall query".to_string()));
    };
    let provider = reg.provider(*chain_id)?;
    Ok(Arc::new(EvmCallSource::new(
        *chain_id,
        *contract,
        calldata.clone(),
        provider,
    )))
}

fn numeric_api(reg: &SourceRegistry, q: &DecodedQuery) -> Result<Arc<dyn TrustedValueSource>, SourceError> {
    match (q.param("url"), q.param("parseStr")) {
        (Some(DynSolValue::String(url)), Some(DynSolValue::String(path))) => {
            Ok(Arc::new(NumericApiSource::new(url, path, reg.client.clone())))
        }
        _ => Err(SourceError::Parse("NumericApiResponse needs url and parseStr".to_string())),
    }
}

pub struct SourceRegistry {
    client: Client,
    rpc_urls: HashMap<u64, String>,
    providers: DashMap<u64, DynProvider>,
    clocks: DashMap<u64, Arc<RpcBlockClock>>,
}

impl SourceRegistry {
    pub fn new(rpc_urls: HashMap<u64, String>, http_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(http_timeout).build()?;
        Ok(Self {
            client,
            rpc_urls,
            providers: DashMap::new(),
            clocks: DashMap::new(),
        })
    }

    pub fn has_template(type_name: &str) -> bool {
        TEMPLATES.iter().any(|(name, _)| *name == type_name)
    }

    /// Build the trusted source for a decoded query. `None` if no template
    /// is registered for its type or its parameters don't fit.
    pub fn for_query(&self, query: &DecodedQuery) -> Option<Arc<dyn TrustedValueSource>> {
        let (_, template) = TEMPLATES.iter().find(|(name, _)| *name == query.type_name())?;
        match template(self, query) {
            Ok(source) => {
                debug!(source = %source.describe(), "built trusted source");
                Some(source)
            }
            Err(e) => {
                warn!(query_type = query.type_name(), error = %e, "cannot build trusted source");
                None
            }
        }
    }

    /// Decode `(typeName, encodedParams)` query data straight into a source.
    pub fn decode_source(&self, query_data: &[u8]) -> Option<Arc<dyn TrustedValueSource>> {
        let query = decode_query(query_data)?;
        self.for_query(&query)
    }

    /// Shared HTTP provider for `chain_id`.
    pub fn provider(&self, chain_id: u64) -> Result<DynProvider, SourceError> {
        if let Some(p) = self.providers.get(&chain_id) {
            return Ok(p.clone());
        }
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or(SourceError::NoEndpoint(chain_id))?
            .parse()
            .map_err(|e| SourceError::Rpc(format!("bad rpc url for chain {chain_id}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        self.providers.insert(chain_id, provider.clone());
        Ok(provider)
    }

    /// Block clock for `chain_id`; compatibility state survives across reports.
    pub fn clock(&self, chain_id: u64) -> Result<Arc<RpcBlockClock>, SourceError> {
        if let Some(c) = self.clocks.get(&chain_id) {
            return Ok(c.clone());
        }
        let clock = Arc::new(RpcBlockClock::new(chain_id, self.provider(chain_id)?));
        self.clocks.insert(chain_id, clock.clone());
        Ok(clock)
    }
}
