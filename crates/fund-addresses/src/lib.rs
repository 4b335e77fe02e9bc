//! The deployment record: which contracts of the fund system live at which
//! addresses on a given network, plus the metadata needed to interact with
//! them again later.

mod legacy;
mod store;

use std::collections::{BTreeMap, BTreeSet};

use ethers::types::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
pub use store::{DeploymentStore, RecordLock};

/// The version of the canonical record layout written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Logical names of the contracts in the record.
pub const FUND: &str = "MockFund";
pub const SHARE_TOKEN: &str = "MFC";
pub const PRICE_ORACLE: &str = "ChainlinkPriceOracle";
pub const UNISWAP_INTEGRATION: &str = "UniswapIntegration";

/// The token symbol the fund is denominated in.
pub const USDC: &str = "USDC";

/// Whether the Uniswap integration quotes hard-coded rates or real prices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FundMode {
    #[default]
    FixedRate,
    Oracle,
}

impl FundMode {
    /// The name of the compiled fund contract for this mode.
    pub fn fund_artifact(&self) -> &'static str {
        match self {
            FundMode::FixedRate => "FixedRateMockFund",
            FundMode::Oracle => "MockFund",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Annual management fee in basis points.
    pub management_fee_bps: u32,
    /// Fee taken from redemption proceeds in basis points.
    pub redemption_fee_bps: u32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            management_fee_bps: 100,
            redemption_fee_bps: 0,
        }
    }
}

/// A deployment record in its canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub schema_version: u32,
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    /// Unix timestamp of the last time the record was written.
    pub timestamp: u64,
    #[serde(default)]
    pub mode: FundMode,
    #[serde(default)]
    pub contracts: BTreeMap<String, Address>,
    #[serde(default)]
    pub tokens: BTreeMap<String, Address>,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,
}

/// The addresses an investor or an inspection needs, resolved from a record.
#[derive(Default, Debug, Eq, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Addresses {
    pub fund: Address,
    pub share_token: Address,
    pub price_oracle: Address,
    pub uniswap_integration: Address,
    pub usdc: Address,
}

impl Deployment {
    pub fn new(
        network: impl Into<String>,
        chain_id: u64,
        deployer: Address,
        mode: FundMode,
        fees: FeeConfig,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            network: network.into(),
            chain_id,
            deployer,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            mode,
            contracts: BTreeMap::new(),
            tokens: BTreeMap::new(),
            fees,
            completed_steps: BTreeSet::new(),
        }
    }

    /// Parses a record in either the canonical layout or one of the legacy
    /// layouts written by older tooling.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if value.get("schema_version").is_some() {
            let deployment: Deployment = serde_json::from_value(value)?;
            if deployment.schema_version > SCHEMA_VERSION {
                return Err(eyre!(
                    "deployment record has schema version {} but only versions up to {} are understood",
                    deployment.schema_version,
                    SCHEMA_VERSION
                ));
            }
            Ok(deployment)
        } else {
            legacy::normalize(value)
        }
    }

    /// Gets a contract's address by its logical name.
    pub fn contract(&self, name: &str) -> Result<Address> {
        self.contracts.get(name).copied().ok_or_else(|| {
            eyre!(
                "contract {} is not in the {} deployment record",
                name,
                self.network
            )
        })
    }

    /// Gets a token's address by its symbol.
    pub fn token(&self, symbol: &str) -> Result<Address> {
        self.tokens.get(symbol).copied().ok_or_else(|| {
            eyre!(
                "token {} is not in the {} deployment record",
                symbol,
                self.network
            )
        })
    }

    pub fn set_contract(&mut self, name: impl Into<String>, address: Address) {
        self.contracts.insert(name.into(), address);
    }

    pub fn set_token(&mut self, symbol: impl Into<String>, address: Address) {
        self.tokens.insert(symbol.into(), address);
    }

    pub fn is_step_completed(&self, id: &str) -> bool {
        self.completed_steps.contains(id)
    }

    pub fn mark_step_completed(&mut self, id: impl Into<String>) {
        self.completed_steps.insert(id.into());
    }

    /// Forgets every completed step matching the predicate so that it runs
    /// again. Returns the forgotten ids.
    pub fn forget_steps(&mut self, mut predicate: impl FnMut(&str) -> bool) -> Vec<String> {
        let forgotten = self
            .completed_steps
            .iter()
            .filter(|id| predicate(id))
            .cloned()
            .collect::<Vec<_>>();
        for id in &forgotten {
            self.completed_steps.remove(id);
        }
        forgotten
    }

    /// Resolves the addresses of the core fund contracts.
    pub fn addresses(&self) -> Result<Addresses> {
        Ok(Addresses {
            fund: self.contract(FUND)?,
            share_token: self.contract(SHARE_TOKEN)?,
            price_oracle: self.contract(PRICE_ORACLE)?,
            uniswap_integration: self.contract(UNISWAP_INTEGRATION)?,
            usdc: self.token(USDC)?,
        })
    }

    pub fn touch(&mut self) {
        self.timestamp = chrono::Utc::now().timestamp().max(0) as u64;
    }
}
