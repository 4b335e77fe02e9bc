//! A declarative description of what to deploy and how to wire it up. The
//! deploy runner executes a manifest idempotently against a deployment
//! record.

mod args;
mod builtin;

use std::{collections::BTreeSet, fs, path::Path};

pub use args::{tokenize, tokenize_all};
pub use builtin::MockFundParams;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reference that resolves to the deployer's address.
pub const DEPLOYER: &str = "deployer";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub contracts: Vec<ContractSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// The logical name the contract is recorded under.
    pub name: String,
    /// The compiled artifact to deploy. Defaults to the logical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Constructor arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Set for ERC20s that are also recorded as tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Sends a transaction calling `function` on `contract`.
    Call {
        id: String,
        contract: String,
        function: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Calls a view function returning an address and records that address
    /// under `record_as`.
    Discover {
        id: String,
        contract: String,
        function: String,
        record_as: String,
    },
}

impl ContractSpec {
    pub fn artifact(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    /// The contracts whose addresses the constructor needs.
    pub fn dependencies(&self) -> BTreeSet<String> {
        references(&self.args)
    }
}

impl Step {
    pub fn id(&self) -> &str {
        match self {
            Step::Call { id, .. } | Step::Discover { id, .. } => id,
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            Step::Call { contract, .. } | Step::Discover { contract, .. } => contract,
        }
    }

    pub fn function(&self) -> &str {
        match self {
            Step::Call { function, .. } | Step::Discover { function, .. } => function,
        }
    }

    /// Every contract the step touches, either as its target or through an
    /// argument.
    pub fn references(&self) -> BTreeSet<String> {
        let mut names = match self {
            Step::Call { args, .. } => references(args),
            Step::Discover { .. } => BTreeSet::new(),
        };
        names.insert(self.contract().to_string());
        names
    }
}

/// Collects the `$Name` references in a list of argument values, not
/// counting `$deployer`.
pub fn references(values: &[Value]) -> BTreeSet<String> {
    fn collect(value: &Value, names: &mut BTreeSet<String>) {
        match value {
            Value::String(s) => {
                if let Some(name) = s.strip_prefix('$') {
                    if name != DEPLOYER {
                        names.insert(name.to_string());
                    }
                }
            }
            Value::Array(values) => values.iter().for_each(|v| collect(v, names)),
            _ => {}
        }
    }
    let mut names = BTreeSet::new();
    values.iter().for_each(|v| collect(v, &mut names));
    names
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse manifest {}", path.display()))?;
        manifest.validate()?;
        manifest.deployment_order()?;
        Ok(manifest)
    }

    pub fn contract(&self, name: &str) -> Option<&ContractSpec> {
        self.contracts.iter().find(|spec| spec.name == name)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id() == id)
    }

    /// Checks names are unique and every reference resolves. Steps may also
    /// reference names recorded by an earlier `discover` step.
    pub fn validate(&self) -> Result<()> {
        let mut known = BTreeSet::new();
        for spec in &self.contracts {
            if spec.name.is_empty() || spec.name.starts_with('$') || spec.name == DEPLOYER {
                return Err(eyre!("manifest: invalid contract name {:?}", spec.name));
            }
            if !known.insert(spec.name.clone()) {
                return Err(eyre!("manifest: contract {} is declared twice", spec.name));
            }
        }
        for spec in &self.contracts {
            if let Some(missing) = spec.dependencies().iter().find(|n| !known.contains(*n)) {
                return Err(eyre!(
                    "manifest: contract {} references unknown contract {}",
                    spec.name,
                    missing
                ));
            }
        }

        let mut ids = BTreeSet::new();
        for step in &self.steps {
            if !ids.insert(step.id().to_string()) {
                return Err(eyre!("manifest: step id {} is used twice", step.id()));
            }
            if let Some(missing) = step.references().iter().find(|n| !known.contains(*n)) {
                return Err(eyre!(
                    "manifest: step {} references unknown contract {}",
                    step.id(),
                    missing
                ));
            }
            if let Step::Discover { record_as, .. } = step {
                known.insert(record_as.clone());
            }
        }
        Ok(())
    }

    /// The contracts in deployment order: every contract comes after the
    /// contracts its constructor references, and otherwise manifest order is
    /// kept.
    pub fn deployment_order(&self) -> Result<Vec<&ContractSpec>> {
        let mut placed = BTreeSet::new();
        let mut order = Vec::with_capacity(self.contracts.len());
        while order.len() < self.contracts.len() {
            let next = self.contracts.iter().find(|spec| {
                !placed.contains(&spec.name)
                    && spec.dependencies().iter().all(|dep| placed.contains(dep))
            });
            match next {
                Some(spec) => {
                    placed.insert(spec.name.clone());
                    order.push(spec);
                }
                None => {
                    let stuck = self
                        .contracts
                        .iter()
                        .filter(|spec| !placed.contains(&spec.name))
                        .map(|spec| spec.name.as_str())
                        .collect::<Vec<_>>();
                    return Err(eyre!(
                        "manifest: constructor references form a cycle between {}",
                        stuck.join(", ")
                    ));
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn contract(name: &str, args: Value) -> ContractSpec {
        ContractSpec {
            name: name.to_string(),
            artifact: None,
            args: serde_json::from_value(args).unwrap(),
            token: None,
        }
    }

    fn names(order: Vec<&ContractSpec>) -> Vec<&str> {
        order.into_iter().map(|spec| spec.name.as_str()).collect()
    }

    #[test]
    fn test_deployment_order_respects_references() -> Result<()> {
        let manifest = Manifest {
            contracts: vec![
                contract("Fund", json!(["$Token", "$Oracle", "$deployer"])),
                contract("Oracle", json!([])),
                contract("Swap", json!(["$Oracle"])),
                contract("Token", json!(["Mock USDC", "USDC", 6])),
            ],
            steps: vec![],
        };
        manifest.validate()?;
        assert_eq!(
            names(manifest.deployment_order()?),
            vec!["Oracle", "Swap", "Token", "Fund"]
        );
        Ok(())
    }

    #[test]
    fn test_cycle_is_rejected() {
        let manifest = Manifest {
            contracts: vec![
                contract("Standalone", json!([])),
                contract("A", json!(["$B"])),
                contract("B", json!([["$A"]])),
            ],
            steps: vec![],
        };
        let err = manifest.deployment_order().unwrap_err().to_string();
        assert!(err.contains("cycle between A, B"), "{}", err);
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let manifest = Manifest {
            contracts: vec![contract("Fund", json!(["$Missing"]))],
            steps: vec![],
        };
        assert!(manifest.validate().unwrap_err().to_string().contains("Missing"));

        let manifest = Manifest {
            contracts: vec![contract("Fund", json!([]))],
            steps: vec![Step::Call {
                id: "mint".into(),
                contract: "Token".into(),
                function: "mint".into(),
                args: vec![],
            }],
        };
        assert!(manifest.validate().unwrap_err().to_string().contains("Token"));
    }

    #[test]
    fn test_discovered_names_can_be_referenced_later() -> Result<()> {
        let manifest: Manifest = serde_json::from_value(json!({
            "contracts": [{ "name": "Fund", "artifact": "MockFund" }],
            "steps": [
                { "kind": "discover", "id": "share", "contract": "Fund", "function": "shareToken", "record_as": "MFC" },
                { "kind": "call", "id": "approve", "contract": "MFC", "function": "approve", "args": ["$Fund", "1e18"] }
            ]
        }))?;
        manifest.validate()?;
        assert_eq!(manifest.contracts[0].artifact(), "MockFund");
        assert_eq!(
            manifest.step("approve").map(Step::references),
            Some(BTreeSet::from(["Fund".to_string(), "MFC".to_string()]))
        );
        Ok(())
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let manifest = Manifest {
            contracts: vec![contract("Fund", json!([])), contract("Fund", json!([]))],
            steps: vec![],
        };
        assert!(manifest.validate().is_err());
    }
}
