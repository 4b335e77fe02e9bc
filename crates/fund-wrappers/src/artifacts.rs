//! Compiled contract artifacts. Both Hardhat (`artifacts/**/<Name>.json`,
//! `"bytecode": "0x..."`) and Foundry (`out/**/<Name>.json`,
//! `"bytecode": {"object": "0x..."}`) layouts are understood.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ethers::{abi::Abi, types::Bytes};
use eyre::{eyre, Result, WrapErr};
use serde_json::Value;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: Abi,
    /// Creation bytecode. Interfaces and abstract contracts don't have any.
    pub bytecode: Option<Bytes>,
}

impl Artifact {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read artifact {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("artifact {} is not valid JSON", path.display()))?;
        let fallback = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        Self::from_json(value, fallback)
            .wrap_err_with(|| format!("failed to parse artifact {}", path.display()))
    }

    pub fn from_json(value: Value, fallback_name: &str) -> Result<Self> {
        let contract_name = value
            .get("contractName")
            .and_then(Value::as_str)
            .unwrap_or(fallback_name)
            .to_string();
        let abi = value
            .get("abi")
            .cloned()
            .ok_or_else(|| eyre!("artifact for {} has no abi", contract_name))?;
        let abi: Abi = serde_json::from_value(abi)
            .wrap_err_with(|| format!("artifact for {} has an invalid abi", contract_name))?;

        let bytecode = match value.get("bytecode") {
            Some(Value::String(code)) => Some(code.as_str()),
            Some(Value::Object(code)) => code.get("object").and_then(Value::as_str),
            _ => None,
        };
        let bytecode = match bytecode.map(|code| code.trim_start_matches("0x")) {
            None | Some("") => None,
            Some(code) if code.contains("__") => {
                return Err(eyre!(
                    "bytecode of {} has unlinked library references",
                    contract_name
                ))
            }
            Some(code) => Some(
                code.parse::<Bytes>()
                    .map_err(|e| eyre!("bytecode of {} is not hex: {}", contract_name, e))?,
            ),
        };

        Ok(Self {
            contract_name,
            abi,
            bytecode,
        })
    }

    /// The creation bytecode, or an error if the artifact can't be deployed.
    pub fn bytecode(&self) -> Result<Bytes> {
        self.bytecode.clone().ok_or_else(|| {
            eyre!(
                "{} has no bytecode; interfaces and abstract contracts can't be deployed",
                self.contract_name
            )
        })
    }
}

/// A directory tree of compiled artifacts.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds and loads the artifact for a contract by name.
    pub fn find(&self, name: &str) -> Result<Artifact> {
        let file_name = format!("{}.json", name);
        let path = find_file(&self.root, &file_name)?.ok_or_else(|| {
            eyre!(
                "no artifact named {} under {}; compile the contracts first",
                file_name,
                self.root.display()
            )
        })?;
        debug!(name, path = %path.display(), "found artifact");
        Artifact::load(&path)
    }
}

fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("failed to read artifacts directory {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    // Sorted so lookups are deterministic when a name appears twice.
    entries.sort_by_key(|entry| entry.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "build-info") {
                continue;
            }
            if let Some(found) = find_file(&path, file_name)? {
                return Ok(Some(found));
            }
        } else if path.file_name().is_some_and(|name| name == file_name) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn abi() -> Value {
        json!([{
            "type": "function",
            "name": "mint",
            "inputs": [
                { "name": "to", "type": "address", "internalType": "address" },
                { "name": "amount", "type": "uint256", "internalType": "uint256" }
            ],
            "outputs": [],
            "stateMutability": "nonpayable"
        }])
    }

    #[test]
    fn test_hardhat_artifact() -> Result<()> {
        let artifact = Artifact::from_json(
            json!({ "contractName": "MockERC20", "abi": abi(), "bytecode": "0x6080" }),
            "ignored",
        )?;
        assert_eq!(artifact.contract_name, "MockERC20");
        assert!(artifact.abi.function("mint").is_ok());
        assert_eq!(artifact.bytecode()?, Bytes::from(vec![0x60, 0x80]));
        Ok(())
    }

    #[test]
    fn test_foundry_artifact() -> Result<()> {
        let artifact = Artifact::from_json(
            json!({ "abi": abi(), "bytecode": { "object": "0x6080", "linkReferences": {} } }),
            "MockERC20",
        )?;
        assert_eq!(artifact.contract_name, "MockERC20");
        assert_eq!(artifact.bytecode()?, Bytes::from(vec![0x60, 0x80]));
        Ok(())
    }

    #[test]
    fn test_interface_cannot_be_deployed() -> Result<()> {
        let artifact = Artifact::from_json(json!({ "abi": abi(), "bytecode": "0x" }), "IERC20")?;
        let err = artifact.bytecode().unwrap_err().to_string();
        assert!(err.contains("IERC20"));
        Ok(())
    }

    #[test]
    fn test_unlinked_bytecode() {
        let value = json!({ "abi": abi(), "bytecode": "0x60__$abcdef$__80" });
        assert!(Artifact::from_json(value, "Linked").is_err());
    }

    #[test]
    fn test_find_skips_debug_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("contracts/MockERC20.sol");
        fs::create_dir_all(&nested)?;
        fs::create_dir_all(dir.path().join("build-info"))?;
        fs::write(
            dir.path().join("build-info/MockERC20.json"),
            json!({ "abi": [], "bytecode": "0x00" }).to_string(),
        )?;
        fs::write(nested.join("MockERC20.dbg.json"), "{}")?;
        fs::write(
            nested.join("MockERC20.json"),
            json!({ "contractName": "MockERC20", "abi": abi(), "bytecode": "0x6080" }).to_string(),
        )?;

        let store = ArtifactStore::new(dir.path());
        let artifact = store.find("MockERC20")?;
        assert!(artifact.abi.function("mint").is_ok());

        let err = store.find("MockFund").unwrap_err().to_string();
        assert!(err.contains("MockFund.json"));
        Ok(())
    }
}
