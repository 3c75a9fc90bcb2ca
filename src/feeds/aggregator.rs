//! Multi-exchange spot price source.
//!
//! Fetches Binance and Coinbase concurrently and fuses whatever answered into
//! a single weighted-median price.

use crate::feeds::{binance, coinbase, SourceError, TrustedValueSource};
use crate::query::ReportValue;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// A price observation from a single exchange.
#[derive(Debug, Clone)]
pub struct PriceObservation {
    pub source: PriceSource,
    pub mid: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSource {
    Binance,
    Coinbase,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::Binance => write!(f, "Binance"),
            PriceSource::Coinbase => write!(f, "Coinbase"),
        }
    }
}

/// Source weight for the weighted median.
/// Binance gets the higher weight for its deeper books.
fn source_weight(source: PriceSource) -> Decimal {
    match source {
        PriceSource::Binance => Decimal::from(3),
        PriceSource::Coinbase => Decimal::from(2),
    }
}

/// The price where cumulative weight first reaches half the total.
pub fn weighted_median(observations: &[PriceObservation]) -> Option<Decimal> {
    match observations {
        [] => return None,
        [only] => return Some(only.mid),
        _ => {}
    }

    let mut weighted: Vec<(Decimal, Decimal)> = observations
        .iter()
        .map(|obs| (obs.mid, source_weight(obs.source)))
        .collect();
    weighted.sort_by(|a, b| a.0.cmp(&b.0));

    let total_weight: Decimal = weighted.iter().map(|(_, w)| *w).sum();
    let half = total_weight / Decimal::from(2);

    let mut cumulative = Decimal::ZERO;
    for (price, weight) in &weighted {
        cumulative += weight;
        if cumulative >= half {
            return Some(*price);
        }
    }

    weighted.last().map(|(p, _)| *p)
}

/// Spot price of `asset` in `currency`.
pub struct SpotPriceSource {
    asset: String,
    currency: String,
    client: Client,
}

impl SpotPriceSource {
    pub fn new(asset: &str, currency: &str, client: Client) -> Self {
        Self {
            asset: asset.to_uppercase(),
            currency: currency.to_uppercase(),
            client,
        }
    }
}

#[async_trait]
impl TrustedValueSource for SpotPriceSource {
    fn describe(&self) -> String {
        format!("spot {}/{}", self.asset, self.currency)
    }

    /// Exchange prices are always current; `at_block` is ignored.
    async fn fetch(&self, _at_block: Option<u64>) -> Result<ReportValue, SourceError> {
        let (b, c) = tokio::join!(
            binance::fetch_spot(&self.client, &self.asset, &self.currency),
            coinbase::fetch_spot(&self.client, &self.asset, &self.currency),
        );

        let mut observations = Vec::with_capacity(2);
        for (source, result) in [(PriceSource::Binance, b), (PriceSource::Coinbase, c)] {
            match result {
                Ok(obs) => observations.push(obs),
                Err(e) => warn!(%source, pair = %self.describe(), error = %e, "price source failed"),
            }
        }

        let price = weighted_median(&observations)
            .ok_or_else(|| SourceError::NoPrice(self.describe()))?;
        debug!(pair = %self.describe(), price = %price, sources = observations.len(), "aggregated price");
        price
            .to_f64()
            .map(ReportValue::Numeric)
            .ok_or_else(|| SourceError::Parse(format!("price {price} out of range")))
    }
}
