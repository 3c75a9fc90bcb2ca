//! Registry of known query types: parameter schema, value codec, capabilities.

use super::{Capabilities, ValueCodec};
use alloy::dyn_abi::DynSolType;

/// One `{name, type}` entry of a query type's parameter schema.
#[derive(Debug, Clone, Copy)]
pub struct ParamField {
    pub name: &'static str,
    pub ty: &'static str,
}

#[derive(Debug)]
pub struct QueryTypeDef {
    pub name: &'static str,
    pub fields: &'static [ParamField],
    pub codec: ValueCodec,
    pub capabilities: Capabilities,
}

impl QueryTypeDef {
    /// Solidity types of the parameters, in schema order.
    pub fn param_types(&self) -> Option<Vec<DynSolType>> {
        self.fields
            .iter()
            .map(|f| DynSolType::parse(f.ty).ok())
            .collect()
    }
}

const NONE: Capabilities = Capabilities {
    always_alert: false,
    has_asset_pair: false,
    is_call: false,
    auto_sourceable: false,
};

const ALWAYS_ALERT: Capabilities = Capabilities {
    always_alert: true,
    ..NONE
};

static REGISTRY: &[QueryTypeDef] = &[
    QueryTypeDef {
        name: "SpotPrice",
        fields: &[
            ParamField { name: "asset", ty: "string" },
            ParamField { name: "currency", ty: "string" },
        ],
        codec: ValueCodec::Numeric { decimals: 18 },
        capabilities: Capabilities {
            has_asset_pair: true,
            auto_sourceable: true,
            ..NONE
        },
    },
    QueryTypeDef {
        name: "EVMCall",
        fields: &[
            ParamField { name: "chainId", ty: "uint256" },
            ParamField { name: "contractAddress", ty: "address" },
            ParamField { name: "calldata", ty: "bytes" },
        ],
        codec: ValueCodec::Tuple,
        capabilities: Capabilities {
            is_call: true,
            auto_sourceable: true,
            ..NONE
        },
    },
    QueryTypeDef {
        name: "LegacyRequest",
        fields: &[ParamField { name: "legacyId", ty: "uint256" }],
        codec: ValueCodec::Numeric { decimals: 6 },
        capabilities: Capabilities {
            has_asset_pair: true,
            auto_sourceable: true,
            ..NONE
        },
    },
    QueryTypeDef {
        name: "TellorOracleAddress",
        fields: &[ParamField { name: "V", ty: "bytes" }],
        codec: ValueCodec::Address,
        capabilities: ALWAYS_ALERT,
    },
    QueryTypeDef {
        name: "AutopayAddresses",
        fields: &[ParamField { name: "phantom", ty: "bytes" }],
        codec: ValueCodec::RawBytes,
        capabilities: ALWAYS_ALERT,
    },
    QueryTypeDef {
        name: "NumericApiResponse",
        fields: &[
            ParamField { name: "url", ty: "string" },
            ParamField { name: "parseStr", ty: "string" },
        ],
        codec: ValueCodec::Numeric { decimals: 18 },
        capabilities: Capabilities {
            auto_sourceable: true,
            ..NONE
        },
    },
    QueryTypeDef {
        name: "StringQuery",
        fields: &[ParamField { name: "text", ty: "string" }],
        codec: ValueCodec::Text,
        capabilities: NONE,
    },
    QueryTypeDef {
        name: "MimicryCollectionStat",
        fields: &[
            ParamField { name: "chainId", ty: "uint256" },
            ParamField { name: "collectionAddress", ty: "address" },
            ParamField { name: "metric", ty: "uint256" },
        ],
        codec: ValueCodec::Numeric { decimals: 18 },
        capabilities: NONE,
    },
];

/// Find a registered query type by its exact name.
pub fn lookup(name: &str) -> Option<&'static QueryTypeDef> {
    REGISTRY.iter().find(|def| def.name == name)
}

pub fn all() -> &'static [QueryTypeDef] {
    REGISTRY
}

/// Asset/currency pairs of the pre-360 numeric request ids.
pub fn legacy_pair(legacy_id: u64) -> Option<(&'static str, &'static str)> {
    match legacy_id {
        1 => Some(("ETH", "USD")),
        2 => Some(("BTC", "USD")),
        10 => Some(("AMPL", "USD")),
        50 => Some(("TRB", "USD")),
        59 => Some(("ETH", "JPY")),
        _ => None,
    }
}
