//! Coinbase REST spot price.
//!
//! `GET /v2/prices/{ASSET}-{CURRENCY}/spot` returns a single amount; Coinbase
//! quotes fiat pairs directly, so no stablecoin mapping is needed.

use crate::feeds::aggregator::{PriceObservation, PriceSource};
use crate::feeds::SourceError;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const COINBASE_API: &str = "https://api.coinbase.com/v2/prices";

// --- Wire types ---

#[derive(Deserialize)]
struct SpotResponse {
    data: SpotData,
}

#[derive(Deserialize)]
struct SpotData {
    amount: String,
}

/// Coinbase product id, e.g. "ETH-USD".
pub fn product_id(asset: &str, currency: &str) -> String {
    format!("{}-{}", asset.to_uppercase(), currency.to_uppercase())
}

fn parse_spot(body: &str) -> Result<Decimal, SourceError> {
    let resp: SpotResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(format!("coinbase: {e}")))?;
    resp.data
        .amount
        .parse::<Decimal>()
        .map_err(|e| SourceError::Parse(format!("coinbase amount: {e}")))
}

pub async fn fetch_spot(
    client: &Client,
    asset: &str,
    currency: &str,
) -> Result<PriceObservation, SourceError> {
    let pid = product_id(asset, currency);
    let url = format!("{COINBASE_API}/{pid}/spot");
    let body = client.get(&url).send().await?.error_for_status()?.text().await?;
    let mid = parse_spot(&body)?;
    debug!(product = %pid, price = %mid, "coinbase spot");
    Ok(PriceObservation {
        source: PriceSource::Coinbase,
        mid,
    })
}
