//! Typed query descriptions and reported values.
//!
//! Every report carries opaque `query_data` bytes. The codec turns them into a
//! [`DecodedQuery`]: a closed [`QueryKind`] union plus the [`ValueCodec`] and
//! [`Capabilities`] of its type, both resolved once from the [`registry`].

pub mod codec;
pub mod registry;

pub use codec::{decode_query, decode_value, encode_query, query_id, DecodedValue};
pub use registry::{lookup, QueryTypeDef};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, U256};
use std::fmt;

/// How the reported `value` bytes of a query type are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCodec {
    /// `uint256` fixed point with the given number of decimals.
    Numeric { decimals: u8 },
    /// ABI-encoded `string`.
    Text,
    /// A single ABI word holding an address.
    Address,
    /// `(bytes returnData, uint256 timestamp)`, used by call-type queries.
    Tuple,
    /// Surfaced unchanged.
    RawBytes,
}

impl ValueCodec {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueCodec::Numeric { .. })
    }
}

/// What a query type can do, resolved at decode time instead of probed later.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Protocol-critical submission: alert immediately, never compare.
    pub always_alert: bool,
    /// Describes an asset/currency pair.
    pub has_asset_pair: bool,
    /// Reported value is `(returnData, blockTimestamp)` of a contract call.
    pub is_call: bool,
    /// A trusted source can be built from the query parameters alone.
    pub auto_sourceable: bool,
}

/// The semantic question a report answers.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    SpotPrice {
        asset: String,
        currency: String,
    },
    EvmCall {
        chain_id: u64,
        contract: Address,
        calldata: Bytes,
    },
    LegacyRequest {
        legacy_id: U256,
    },
    /// Any other registered type, parameters kept type-erased.
    Custom {
        type_name: String,
        params: Vec<(String, DynSolValue)>,
    },
    /// Well-formed envelope whose type is not registered.
    Unknown {
        type_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedQuery {
    pub kind: QueryKind,
    pub codec: ValueCodec,
    pub capabilities: Capabilities,
}

impl DecodedQuery {
    pub fn type_name(&self) -> &str {
        match &self.kind {
            QueryKind::SpotPrice { .. } => "SpotPrice",
            QueryKind::EvmCall { .. } => "EVMCall",
            QueryKind::LegacyRequest { .. } => "LegacyRequest",
            QueryKind::Custom { type_name, .. } => type_name,
            QueryKind::Unknown { type_name } => type_name,
        }
    }

    /// Asset/currency pair for display, upper-cased.
    pub fn asset_pair(&self) -> Option<(String, String)> {
        match &self.kind {
            QueryKind::SpotPrice { asset, currency } => Some((asset.clone(), currency.clone())),
            QueryKind::LegacyRequest { legacy_id } => {
                let id: u64 = (*legacy_id).try_into().ok()?;
                registry::legacy_pair(id).map(|(a, c)| (a.to_string(), c.to_string()))
            }
            _ => None,
        }
    }

    /// True when no parameters are bound (only a bare type is known).
    pub fn is_bare(&self) -> bool {
        matches!(&self.kind, QueryKind::Custom { params, .. } if params.is_empty())
    }

    /// Look up a type-erased parameter by name.
    pub fn param(&self, name: &str) -> Option<&DynSolValue> {
        match &self.kind {
            QueryKind::Custom { params, .. } => {
                params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

/// A decoded report value, or a trusted value to compare it with.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportValue {
    Numeric(f64),
    Text(String),
    Bytes(Bytes),
    Tuple(Vec<ReportValue>),
}

impl ReportValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReportValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// `(returnData, blockTimestamp)` of a call-type value.
    pub fn call_result(&self) -> Option<(&Bytes, u64)> {
        match self {
            ReportValue::Tuple(items) => match items.as_slice() {
                [ReportValue::Bytes(data), ReportValue::Numeric(ts)] if *ts >= 0.0 => {
                    Some((data, *ts as u64))
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ReportValue::Numeric(_) => "numeric",
            ReportValue::Text(_) => "text",
            ReportValue::Bytes(_) => "bytes",
            ReportValue::Tuple(_) => "tuple",
        }
    }
}

impl fmt::Display for ReportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportValue::Numeric(v) => write!(f, "{v}"),
            ReportValue::Text(s) => write!(f, "{s}"),
            ReportValue::Bytes(b) => write!(f, "{b}"),
            ReportValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
