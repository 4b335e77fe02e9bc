//! Normalization of the hand-written record layouts that predate the
//! canonical schema: a nested `{"contracts": {...}}` document and a flat
//! `{"MockUSDC": "0x..."}` map.

use ethers::types::Address;
use eyre::{eyre, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Deployment, FeeConfig, FundMode, FUND, PRICE_ORACLE, SHARE_TOKEN, SCHEMA_VERSION};

/// Token contracts that older records stored under a `Mock` prefix.
const TOKEN_SYMBOLS: [&str; 5] = ["USDC", "WETH", "WBTC", "LINK", "DAI"];

/// Top-level keys of a flat record that describe the record rather than
/// name a contract.
const METADATA_KEYS: [&str; 8] = [
    "network",
    "deployer",
    "timestamp",
    "chainId",
    "chain_id",
    "fees",
    "tokens",
    "fixedRate",
];

/// Older names for contracts that now have a single logical name.
const ALIASES: [(&str, &str); 6] = [
    ("FixedRateMockFund", FUND),
    ("PriceOracle", PRICE_ORACLE),
    ("MFCToken", SHARE_TOKEN),
    ("FundShareToken", SHARE_TOKEN),
    ("shareToken", SHARE_TOKEN),
    ("UniswapV3Integration", crate::UNISWAP_INTEGRATION),
];

pub(crate) fn normalize(value: Value) -> Result<Deployment> {
    let object = match value {
        Value::Object(object) => object,
        other => return Err(eyre!("deployment record must be an object, found {}", other)),
    };

    let mut deployment = Deployment {
        schema_version: SCHEMA_VERSION,
        network: string_field(&object, &["network"]).unwrap_or_default(),
        chain_id: object
            .get("chainId")
            .or_else(|| object.get("chain_id"))
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        deployer: string_field(&object, &["deployer"])
            .and_then(|s| s.parse::<Address>().ok())
            .unwrap_or_default(),
        timestamp: object.get("timestamp").map(parse_timestamp).unwrap_or_default(),
        mode: FundMode::Oracle,
        contracts: Default::default(),
        tokens: Default::default(),
        fees: parse_fees(&object),
        completed_steps: Default::default(),
    };

    // Nested records keep addresses under `contracts` and sometimes under
    // `tokens`; flat records keep everything at the top level.
    let (contracts, tokens) = match object.get("contracts") {
        Some(Value::Object(contracts)) => (
            contracts.clone(),
            object
                .get("tokens")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        ),
        _ => (
            object
                .iter()
                .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            object
                .get("tokens")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        ),
    };

    for (name, value) in &contracts {
        let Some(address) = as_address(value) else {
            debug!(key = %name, "skipping non-address entry in legacy record");
            continue;
        };
        if name == "FixedRateMockFund" {
            deployment.mode = FundMode::FixedRate;
        }
        if let Some(symbol) = name
            .strip_prefix("Mock")
            .filter(|symbol| TOKEN_SYMBOLS.contains(symbol))
        {
            deployment.set_token(symbol, address);
        }
        deployment.set_contract(canonical_name(name), address);
    }
    for (symbol, value) in &tokens {
        if let Some(address) = as_address(value) {
            let symbol = symbol.strip_prefix("Mock").unwrap_or(symbol);
            deployment.set_token(symbol, address);
        }
    }

    if let Some(mode) = object.get("fixedRate").and_then(Value::as_bool) {
        deployment.mode = if mode {
            FundMode::FixedRate
        } else {
            FundMode::Oracle
        };
    }

    Ok(deployment)
}

fn canonical_name(name: &str) -> String {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn as_address(value: &Value) -> Option<Address> {
    value.as_str().and_then(|s| s.parse::<Address>().ok())
}

/// Legacy timestamps are either unix seconds or ISO-8601 strings.
fn parse_timestamp(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        Value::String(s) => s
            .parse::<u64>()
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.timestamp().max(0) as u64)
            })
            .unwrap_or_default(),
        _ => 0,
    }
}

fn parse_fees(object: &Map<String, Value>) -> FeeConfig {
    let mut fees = FeeConfig::default();
    let nested = object.get("fees").and_then(Value::as_object);
    let lookup = |keys: &[&str]| {
        keys.iter().find_map(|key| {
            nested
                .and_then(|fees| fees.get(*key))
                .or_else(|| object.get(*key))
                .and_then(|v| {
                    v.as_u64()
                        .or_else(|| v.as_str().and_then(|s| s.parse::<u64>().ok()))
                })
        })
    };
    let bps = |name: &str, keys: &[&str]| {
        lookup(keys).and_then(|bps| match u32::try_from(bps) {
            Ok(bps) => Some(bps),
            Err(_) => {
                warn!(fee = name, bps, "ignoring out of range fee in legacy record");
                None
            }
        })
    };
    if let Some(bps) = bps(
        "management",
        &["management_fee_bps", "managementFeeRate", "managementFee"],
    ) {
        fees.management_fee_bps = bps;
    }
    if let Some(bps) = bps(
        "redemption",
        &["redemption_fee_bps", "redemptionFeeRate", "redemptionFee"],
    ) {
        fees.redemption_fee_bps = bps;
    }
    fees
}
