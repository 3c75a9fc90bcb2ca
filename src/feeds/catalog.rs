//! Well-known feeds, addressable by tag or by query id.

use crate::query::{decode_query, encode_query, query_id, DecodedQuery, QueryKind};

use alloy::primitives::{Bytes, B256, U256};

#[derive(Debug, Clone, Copy)]
enum Entry {
    Spot(&'static str, &'static str),
    Legacy(u64),
}

static CATALOG: &[(&str, Entry)] = &[
    ("eth-usd-spot", Entry::Spot("eth", "usd")),
    ("btc-usd-spot", Entry::Spot("btc", "usd")),
    ("trb-usd-spot", Entry::Spot("trb", "usd")),
    ("matic-usd-spot", Entry::Spot("matic", "usd")),
    ("ohm-eth-spot", Entry::Spot("ohm", "eth")),
    ("eth-btc-spot", Entry::Spot("eth", "btc")),
    ("bct-usd-spot", Entry::Spot("bct", "usd")),
    ("dai-usd-spot", Entry::Spot("dai", "usd")),
    ("ric-usd-spot", Entry::Spot("ric", "usd")),
    ("idle-usd-spot", Entry::Spot("idle", "usd")),
    ("mkr-usd-spot", Entry::Spot("mkr", "usd")),
    ("sushi-usd-spot", Entry::Spot("sushi", "usd")),
    ("usdc-usd-spot", Entry::Spot("usdc", "usd")),
    ("legacy-request-1", Entry::Legacy(1)),
    ("legacy-request-2", Entry::Legacy(2)),
    ("legacy-request-10", Entry::Legacy(10)),
    ("legacy-request-50", Entry::Legacy(50)),
    ("legacy-request-59", Entry::Legacy(59)),
];

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub tag: &'static str,
    pub query_data: Bytes,
    pub query_id: B256,
    pub query: DecodedQuery,
}

fn build(tag: &'static str, entry: Entry) -> Option<CatalogEntry> {
    let kind = match entry {
        Entry::Spot(asset, currency) => QueryKind::SpotPrice {
            asset: asset.to_string(),
            currency: currency.to_string(),
        },
        Entry::Legacy(id) => QueryKind::LegacyRequest {
            legacy_id: U256::from(id),
        },
    };
    let query_data = encode_query(&kind)?;
    let query = decode_query(&query_data)?;
    Some(CatalogEntry {
        tag,
        query_id: query_id(&query.kind, &query_data),
        query_data,
        query,
    })
}

pub fn entries() -> impl Iterator<Item = CatalogEntry> {
    CATALOG.iter().filter_map(|(tag, entry)| build(tag, *entry))
}

pub fn find_by_tag(tag: &str) -> Option<CatalogEntry> {
    CATALOG
        .iter()
        .find(|(t, _)| *t == tag)
        .and_then(|(t, entry)| build(t, *entry))
}

pub fn find_by_id(id: B256) -> Option<CatalogEntry> {
    entries().find(|e| e.query_id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_known_ids() {
        let eth = find_by_tag("eth-usd-spot").unwrap();
        assert_eq!(
            eth.query_id,
            b256!("83a7f3d48786ac2667503a61e8c415438ed2922eb86a2906e4ee66d9a2ce4992")
        );
        let btc = find_by_id(b256!(
            "a6f013ee236804827b77696d350e9f0ac3e879328f2a3021d473a0b778ad78ac"
        ))
        .unwrap();
        assert_eq!(btc.tag, "btc-usd-spot");
        assert_eq!(
            find_by_tag("trb-usd-spot").unwrap().query_id,
            b256!("5c13cd9c97dbb98f2429c101a2a8150e6c7a0ddaff6124ee176a3a411067ded0")
        );
    }

    #[test]
    fn test_legacy_ids_are_padded() {
        let e = find_by_tag("legacy-request-50").unwrap();
        assert_eq!(e.query_id, B256::left_padding_from(&[50]));
        assert_eq!(e.query.asset_pair(), Some(("TRB".into(), "USD".into())));
    }

    #[test]
    fn test_every_entry_builds() {
        assert_eq!(entries().count(), CATALOG.len());
    }
}
