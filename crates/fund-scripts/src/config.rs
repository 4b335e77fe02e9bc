//! Runtime configuration: the target network and the values read from the
//! environment (and a `.env` file, if there is one).

use std::{fmt, path::PathBuf};

use clap::ValueEnum;
use ethers::signers::{coins_bip39::English, LocalWallet, MnemonicBuilder};
use eyre::{eyre, Result, WrapErr};
use fund_addresses::DeploymentStore;
use fund_wrappers::ArtifactStore;
use serde::Deserialize;

use crate::constants::{DEV_MNEMONIC, SEPOLIA_CHAIN_ID};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum Network {
    /// A node already running on `LOCALHOST_RPC_URL`.
    Localhost,
    /// An ephemeral anvil node that lives for one command.
    Hardhat,
    Sepolia,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Localhost => "localhost",
            Network::Hardhat => "hardhat",
            Network::Sepolia => "sepolia",
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, Network::Sepolia)
    }

    /// The chain id the network is known to have, if it's fixed.
    pub fn expected_chain_id(&self) -> Option<u64> {
        match self {
            Network::Sepolia => Some(SEPOLIA_CHAIN_ID),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn default_localhost_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Environment variables understood by the scripts.
#[derive(Clone, Deserialize)]
pub struct Env {
    pub private_key: Option<String>,
    pub sepolia_rpc_url: Option<String>,
    #[serde(default = "default_localhost_rpc_url")]
    pub localhost_rpc_url: String,
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Env {
    /// Reads the process environment after loading `.env`. A missing `.env`
    /// file is fine.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        envy::from_iter(vars).wrap_err("invalid environment")
    }
}

/// Everything a command needs to know about where it runs.
#[derive(Clone)]
pub struct Config {
    pub network: Network,
    /// `None` means an ephemeral node is spawned.
    pub rpc_url: Option<String>,
    pub deployments_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    private_key: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url)
            .field("deployments_dir", &self.deployments_dir)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Resolves the configuration for a network. Directories given on the
    /// command line take precedence over the environment.
    pub fn new(
        network: Network,
        env: Env,
        deployments_dir: Option<PathBuf>,
        artifacts_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let rpc_url = match network {
            Network::Localhost => Some(env.localhost_rpc_url),
            Network::Hardhat => None,
            Network::Sepolia => Some(
                env.sepolia_rpc_url
                    .ok_or_else(|| eyre!("SEPOLIA_RPC_URL must be set to use sepolia"))?,
            ),
        };
        if network == Network::Sepolia && env.private_key.is_none() {
            return Err(eyre!("PRIVATE_KEY must be set to use sepolia"));
        }
        Ok(Self {
            network,
            rpc_url,
            deployments_dir: deployments_dir.unwrap_or(env.deployments_dir),
            artifacts_dir: artifacts_dir.unwrap_or(env.artifacts_dir),
            private_key: env.private_key,
        })
    }

    /// The signer for transactions. Local networks fall back to the first
    /// development account.
    pub fn signer(&self) -> Result<LocalWallet> {
        match &self.private_key {
            Some(key) => key
                .trim()
                .parse::<LocalWallet>()
                .map_err(|e| eyre!("PRIVATE_KEY is not a valid private key: {}", e)),
            None if self.network.is_local() => dev_account(0),
            None => Err(eyre!("PRIVATE_KEY must be set to use {}", self.network)),
        }
    }

    pub fn store(&self) -> DeploymentStore {
        DeploymentStore::new(&self.deployments_dir)
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.artifacts_dir)
    }
}

/// One of the funded accounts of a local development node.
pub fn dev_account(index: u32) -> Result<LocalWallet> {
    Ok(MnemonicBuilder::<English>::default()
        .phrase(DEV_MNEMONIC)
        .index(index)?
        .build()?)
}

#[cfg(test)]
mod tests {
    use ethers::{signers::Signer, types::Address};

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Result<Env> {
        Env::from_vars(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
    }

    #[test]
    fn test_env_defaults() -> Result<()> {
        let env = env(&[])?;
        assert_eq!(env.localhost_rpc_url, "http://127.0.0.1:8545");
        assert_eq!(env.deployments_dir, PathBuf::from("deployments"));
        assert_eq!(env.artifacts_dir, PathBuf::from("artifacts"));
        assert!(env.private_key.is_none());
        Ok(())
    }

    #[test]
    fn test_local_networks_use_dev_account() -> Result<()> {
        let config = Config::new(Network::Localhost, env(&[])?, None, None)?;
        assert_eq!(config.rpc_url.as_deref(), Some("http://127.0.0.1:8545"));
        assert_eq!(
            config.signer()?.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>()?
        );

        let config = Config::new(Network::Hardhat, env(&[])?, None, None)?;
        assert_eq!(config.rpc_url, None);
        Ok(())
    }

    #[test]
    fn test_sepolia_requires_url_and_key() -> Result<()> {
        let err = Config::new(Network::Sepolia, env(&[])?, None, None).unwrap_err();
        assert!(err.to_string().contains("SEPOLIA_RPC_URL"));

        let err = Config::new(
            Network::Sepolia,
            env(&[("SEPOLIA_RPC_URL", "https://rpc.sepolia.org")])?,
            None,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("PRIVATE_KEY"));

        let config = Config::new(
            Network::Sepolia,
            env(&[
                ("SEPOLIA_RPC_URL", "https://rpc.sepolia.org"),
                (
                    "PRIVATE_KEY",
                    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
                ),
            ])?,
            Some(PathBuf::from("records")),
            None,
        )?;
        assert_eq!(config.deployments_dir, PathBuf::from("records"));
        assert_eq!(
            config.signer()?.address(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>()?
        );
        // The key never shows up in debug output.
        assert!(!format!("{:?}", config).contains("59c6995e"));
        Ok(())
    }

    #[test]
    fn test_dev_accounts() -> Result<()> {
        assert_eq!(
            dev_account(1)?.address(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>()?
        );
        Ok(())
    }
}
