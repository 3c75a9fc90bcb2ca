//! Query-data and value codec.
//!
//! Query data is tried against an ordered list of decoders (ABI envelope
//! first, JSON second); the first match wins and nothing here ever panics on
//! hostile input.

use super::registry::{self, QueryTypeDef};
use super::{DecodedQuery, QueryKind, ReportValue, ValueCodec};
use crate::onchain::abi::keccak256;
use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::Value;
use tracing::{debug, warn};

type Decoder = fn(&[u8]) -> Option<DecodedQuery>;

/// Decoders in precedence order.
const DECODERS: &[(&str, Decoder)] = &[("abi", decode_abi_query), ("json", decode_json_query)];

/// Decode opaque query data. `None` means unsupported.
pub fn decode_query(data: &[u8]) -> Option<DecodedQuery> {
    DECODERS.iter().find_map(|(name, decode)| {
        let query = decode(data)?;
        debug!(decoder = name, query_type = query.type_name(), "decoded query data");
        Some(query)
    })
}

fn decode_abi_query(data: &[u8]) -> Option<DecodedQuery> {
    let envelope = DynSolType::Tuple(vec![DynSolType::String, DynSolType::Bytes])
        .abi_decode_params(data)
        .ok()?;
    let (type_name, params) = match envelope {
        DynSolValue::Tuple(items) => match items.as_slice() {
            [DynSolValue::String(t), DynSolValue::Bytes(p)] => (t.clone(), p.clone()),
            _ => return None,
        },
        _ => return None,
    };

    let Some(def) = registry::lookup(&type_name) else {
        return Some(unknown(type_name));
    };

    let types = def.param_types()?;
    let values = if types.is_empty() {
        Vec::new()
    } else {
        match DynSolType::Tuple(types).abi_decode_params(&params) {
            Ok(DynSolValue::Tuple(values)) => values,
            // Always-alert types are flagged on their type alone.
            _ if def.capabilities.always_alert => Vec::new(),
            _ => {
                debug!(query_type = %type_name, "query parameters do not match schema");
                return None;
            }
        }
    };

    build(def, values)
}

fn decode_json_query(data: &[u8]) -> Option<DecodedQuery> {
    let Value::Object(map) = serde_json::from_slice::<Value>(data).ok()? else {
        return None;
    };
    let type_name = map.get("type")?.as_str()?.to_string();

    let Some(def) = registry::lookup(&type_name) else {
        return Some(unknown(type_name));
    };

    let types = def.param_types()?;
    let values = def
        .fields
        .iter()
        .zip(types.iter())
        .map(|(field, ty)| json_param(ty, map.get(field.name)?))
        .collect::<Option<Vec<_>>>()?;

    build(def, values)
}

fn json_param(ty: &DynSolType, value: &Value) -> Option<DynSolValue> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    ty.coerce_str(&text).ok()
}

fn unknown(type_name: String) -> DecodedQuery {
    DecodedQuery {
        kind: QueryKind::Unknown { type_name },
        codec: ValueCodec::RawBytes,
        capabilities: Default::default(),
    }
}

/// Lift registry-typed parameters into the closed query union.
fn build(def: &QueryTypeDef, values: Vec<DynSolValue>) -> Option<DecodedQuery> {
    let kind = match def.name {
        "SpotPrice" => match values.as_slice() {
            [DynSolValue::String(asset), DynSolValue::String(currency)] => QueryKind::SpotPrice {
                asset: asset.to_uppercase(),
                currency: currency.to_uppercase(),
            },
            _ => return None,
        },
        "EVMCall" => match values.as_slice() {
            [DynSolValue::Uint(chain_id, _), DynSolValue::Address(contract), DynSolValue::Bytes(calldata)] => {
                QueryKind::EvmCall {
                    chain_id: u64::try_from(*chain_id).ok()?,
                    contract: *contract,
                    calldata: Bytes::from(calldata.clone()),
                }
            }
            _ => return None,
        },
        "LegacyRequest" => match values.as_slice() {
            [DynSolValue::Uint(legacy_id, _)] => QueryKind::LegacyRequest {
                legacy_id: *legacy_id,
            },
            _ => return None,
        },
        name => QueryKind::Custom {
            type_name: name.to_string(),
            params: def
                .fields
                .iter()
                .map(|f| f.name.to_string())
                .zip(values)
                .collect(),
        },
    };

    Some(DecodedQuery {
        kind,
        codec: def.codec,
        capabilities: def.capabilities,
    })
}

/// ABI-encode a query as `(string queryType, bytes encodedParameters)`.
pub fn encode_query(kind: &QueryKind) -> Option<Bytes> {
    let (name, params): (&str, Vec<DynSolValue>) = match kind {
        QueryKind::SpotPrice { asset, currency } => (
            "SpotPrice",
            vec![
                DynSolValue::String(asset.to_lowercase()),
                DynSolValue::String(currency.to_lowercase()),
            ],
        ),
        QueryKind::EvmCall {
            chain_id,
            contract,
            calldata,
        } => (
            "EVMCall",
            vec![
                DynSolValue::Uint(U256::from(*chain_id), 256),
                DynSolValue::Address(*contract),
                DynSolValue::Bytes(calldata.to_vec()),
            ],
        ),
        QueryKind::LegacyRequest { legacy_id } => {
            ("LegacyRequest", vec![DynSolValue::Uint(*legacy_id, 256)])
        }
        QueryKind::Custom { type_name, params } => (
            type_name.as_str(),
            params.iter().map(|(_, v)| v.clone()).collect(),
        ),
        QueryKind::Unknown { .. } => return None,
    };

    let encoded_params = if params.is_empty() {
        Vec::new()
    } else {
        DynSolValue::Tuple(params).abi_encode_params()
    };
    let envelope = DynSolValue::Tuple(vec![
        DynSolValue::String(name.to_string()),
        DynSolValue::Bytes(encoded_params),
    ]);
    Some(Bytes::from(envelope.abi_encode_params()))
}

/// On-chain id of a query: keccak of its data, or the padded legacy id.
pub fn query_id(kind: &QueryKind, query_data: &[u8]) -> B256 {
    match kind {
        QueryKind::LegacyRequest { legacy_id } => B256::from(legacy_id.to_be_bytes::<32>()),
        _ => keccak256(query_data),
    }
}

/// A decoded value plus an operator-facing warning when the bytes were malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub value: ReportValue,
    pub warning: Option<String>,
}

impl DecodedValue {
    fn clean(value: ReportValue) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    /// Malformed input is evidence too: keep the raw bytes.
    fn raw(raw: &[u8], warning: String) -> Self {
        warn!(len = raw.len(), %warning, "surfacing raw report value");
        Self {
            value: ReportValue::Bytes(Bytes::copy_from_slice(raw)),
            warning: Some(warning),
        }
    }
}

/// Decode reported value bytes with the codec of the query's type.
pub fn decode_value(query: &DecodedQuery, raw: &[u8]) -> DecodedValue {
    match query.codec {
        ValueCodec::Numeric { decimals } => {
            if raw.len() != 32 {
                return DecodedValue::raw(raw, length_mismatch(raw.len(), 32));
            }
            DecodedValue::clean(ReportValue::Numeric(scale(
                U256::from_be_slice(raw),
                decimals,
            )))
        }
        ValueCodec::Address => {
            if raw.len() != 32 {
                return DecodedValue::raw(raw, length_mismatch(raw.len(), 32));
            }
            let addr = Address::from_slice(&raw[12..]);
            DecodedValue::clean(ReportValue::Text(addr.to_string()))
        }
        ValueCodec::Text => match DynSolType::String.abi_decode(raw) {
            Ok(DynSolValue::String(s)) => DecodedValue::clean(ReportValue::Text(s)),
            _ => DecodedValue::raw(raw, format!("{} bytes are not an encoded string", raw.len())),
        },
        ValueCodec::Tuple => {
            let ty = DynSolType::Tuple(vec![DynSolType::Bytes, DynSolType::Uint(256)]);
            match ty.abi_decode_params(raw) {
                Ok(DynSolValue::Tuple(items)) => match items.as_slice() {
                    [DynSolValue::Bytes(data), DynSolValue::Uint(ts, _)] => {
                        DecodedValue::clean(ReportValue::Tuple(vec![
                            ReportValue::Bytes(Bytes::from(data.clone())),
                            ReportValue::Numeric(scale(*ts, 0)),
                        ]))
                    }
                    _ => DecodedValue::raw(raw, "unexpected call result shape".to_string()),
                },
                _ => DecodedValue::raw(
                    raw,
                    format!("{} bytes are not an encoded (bytes, uint256)", raw.len()),
                ),
            }
        }
        ValueCodec::RawBytes => DecodedValue::clean(ReportValue::Bytes(Bytes::copy_from_slice(raw))),
    }
}

fn length_mismatch(got: usize, expected: usize) -> String {
    format!("value length {got} does not match expected {expected}")
}

fn scale(value: U256, decimals: u8) -> f64 {
    let whole = value.to_string().parse::<f64>().unwrap_or(f64::NAN);
    whole / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::hex;
    use alloy::primitives::b256;

    const OHM_ETH_QUERY_DATA: &str = "00000000000000000000000000000000000000000000000000000000000000400000000000000000000000000000000000000000000000000000000000000080000000000000000000000000000000000000000000000000000000000000000953706f745072696365000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000c00000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000008000000000000000000000000000000000000000000000000000000000000000036f686d000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000036574680000000000000000000000000000000000000000000000000000000000";

    fn spot(asset: &str, currency: &str) -> QueryKind {
        QueryKind::SpotPrice {
            asset: asset.to_string(),
            currency: currency.to_string(),
        }
    }

    #[test]
    fn test_spot_price_round_trip_upper_cases_pair() {
        let data = encode_query(&spot("eth", "usd")).unwrap();
        let q = decode_query(&data).unwrap();
        assert_eq!(q.kind, spot("ETH", "USD"));
        assert!(q.capabilities.has_asset_pair);
        assert_eq!(q.codec, ValueCodec::Numeric { decimals: 18 });
        assert_eq!(
            query_id(&q.kind, &data),
            b256!("83a7f3d48786ac2667503a61e8c415438ed2922eb86a2906e4ee66d9a2ce4992")
        );
    }

    #[test]
    fn test_decodes_on_chain_query_data() {
        let data = hex::decode(OHM_ETH_QUERY_DATA).unwrap();
        let q = decode_query(&data).unwrap();
        assert_eq!(q.kind, spot("OHM", "ETH"));
    }

    #[test]
    fn test_json_query_is_second_choice() {
        let data = br#"{"type":"SpotPrice","asset":"btc","currency":"usd"}"#;
        let q = decode_query(data).unwrap();
        assert_eq!(q.kind, spot("BTC", "USD"));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        assert!(decode_query(b"definitely not a query").is_none());
        assert!(decode_query(&[]).is_none());
        assert!(decode_query(br#"{"asset":"eth"}"#).is_none());
    }

    #[test]
    fn test_unregistered_type_is_unknown() {
        let envelope = DynSolValue::Tuple(vec![
            DynSolValue::String("SomethingNew".to_string()),
            DynSolValue::Bytes(vec![1, 2, 3]),
        ]);
        let q = decode_query(&envelope.abi_encode_params()).unwrap();
        assert_eq!(q.type_name(), "SomethingNew");
        assert_eq!(q.codec, ValueCodec::RawBytes);
    }

    #[test]
    fn test_custom_params_are_named() {
        let kind = QueryKind::Custom {
            type_name: "NumericApiResponse".to_string(),
            params: vec![
                ("url".to_string(), DynSolValue::String("https://x.io/p".to_string())),
                ("parseStr".to_string(), DynSolValue::String("data, price".to_string())),
            ],
        };
        let data = encode_query(&kind).unwrap();
        let q = decode_query(&data).unwrap();
        assert_eq!(q.kind, kind);
        assert_eq!(
            q.param("parseStr"),
            Some(&DynSolValue::String("data, price".to_string()))
        );
    }

    #[test]
    fn test_legacy_query_id_is_padded_id() {
        let kind = QueryKind::LegacyRequest {
            legacy_id: U256::from(1),
        };
        let data = encode_query(&kind).unwrap();
        let id = query_id(&kind, &data);
        assert_eq!(id, B256::with_last_byte(1));
    }

    #[test]
    fn test_numeric_value_scales_by_decimals() {
        let q = decode_query(&encode_query(&spot("eth", "usd")).unwrap()).unwrap();
        let raw = U256::from(1500u64) * U256::from(10u64).pow(U256::from(18));
        let decoded = decode_value(&q, &raw.to_be_bytes::<32>());
        assert_eq!(decoded.value, ReportValue::Numeric(1500.0));
        assert!(decoded.warning.is_none());
    }

    #[test]
    fn test_length_mismatch_surfaces_raw_bytes() {
        let q = decode_query(&encode_query(&spot("eth", "usd")).unwrap()).unwrap();
        let decoded = decode_value(&q, &[0xde, 0xad]);
        assert_eq!(
            decoded.value,
            ReportValue::Bytes(Bytes::from_static(&[0xde, 0xad]))
        );
        assert!(decoded.warning.unwrap().contains("length 2"));
    }

    #[test]
    fn test_call_result_value() {
        let kind = QueryKind::EvmCall {
            chain_id: 1,
            contract: Address::repeat_byte(0x11),
            calldata: Bytes::from_static(&[0x18, 0x16, 0x0d, 0xdd]),
        };
        let q = decode_query(&encode_query(&kind).unwrap()).unwrap();
        assert!(q.capabilities.is_call);

        let raw = hex::decode("00000000000000000000000000000000000000000000000000000000000000400000000000000000000000000000000000000000000000000000000064528c2b00000000000000000000000000000000000000000000000000000000000000200000000000000000000000000000000000000000000000000000000000003039").unwrap();
        let decoded = decode_value(&q, &raw);
        let (data, ts) = decoded.value.call_result().unwrap();
        assert_eq!(ts, 1683131435);
        assert_eq!(U256::from_be_slice(data), U256::from(12345));
    }
}
