//! Binance REST book ticker.
//!
//! Binance lists USD pairs against USDT, so a USD quote is read from the
//! `<ASSET>USDT` book and the bid/ask mid is used as the price.

use crate::feeds::aggregator::{PriceObservation, PriceSource};
use crate::feeds::SourceError;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const BINANCE_API: &str = "https://api.binance.com/api/v3/ticker/bookTicker";

#[derive(Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

/// Binance symbol for a pair, e.g. "ETHUSDT" for ETH/USD.
pub fn symbol(asset: &str, currency: &str) -> String {
    let currency = currency.to_uppercase();
    let quote = if currency == "USD" { "USDT" } else { currency.as_str() };
    format!("{}{}", asset.to_uppercase(), quote)
}

fn parse_book(body: &str) -> Result<Decimal, SourceError> {
    let book: BookTicker =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(format!("binance: {e}")))?;
    match (book.bid_price.parse::<Decimal>(), book.ask_price.parse::<Decimal>()) {
        (Ok(bid), Ok(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => {
            Ok((bid + ask) / Decimal::from(2))
        }
        _ => Err(SourceError::Parse("binance: empty book".to_string())),
    }
}

pub async fn fetch_spot(
    client: &Client,
    asset: &str,
    currency: &str,
) -> Result<PriceObservation, SourceError> {
    let sym = symbol(asset, currency);
    let body = client
        .get(BINANCE_API)
        .query(&[("symbol", sym.as_str())])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let mid = parse_book(&body)?;
    debug!(symbol = %sym, price = %mid, "binance book mid");
    Ok(PriceObservation {
        source: PriceSource::Binance,
        mid,
    })
}
