use std::sync::Arc;

use ethers::signers::LocalWallet;
use eyre::Result;
use fund_addresses::{Deployment, DeploymentStore, FeeConfig, FundMode};
use fund_scripts::{
    chain::{Chain, ChainClient},
    config::{dev_account, Env},
    deploy::{DeployOptions, DeploySummary, Deployer},
    manifest::{Manifest, MockFundParams},
};
use fund_wrappers::ArtifactStore;
use tempfile::TempDir;

/// An ephemeral anvil node with a scratch deployment record directory.
/// Needs compiled artifacts under `ARTIFACTS_DIR`.
pub struct TestEnv {
    pub chain: Chain,
    pub client: Arc<ChainClient<LocalWallet>>,
    pub records: TempDir,
    pub artifacts: ArtifactStore,
}

impl TestEnv {
    pub async fn new() -> Result<Self> {
        let chain = Chain::connect(None).await?;
        let client = chain.client(dev_account(0)?).await?;
        Ok(Self {
            chain,
            client,
            records: tempfile::tempdir()?,
            artifacts: ArtifactStore::new(Env::load()?.artifacts_dir),
        })
    }

    pub fn store(&self) -> DeploymentStore {
        DeploymentStore::new(self.records.path())
    }

    pub fn deployer(&self) -> Deployer<ChainClient<LocalWallet>> {
        Deployer::new(
            self.client.clone(),
            self.store(),
            self.artifacts.clone(),
            "hardhat",
        )
    }

    pub async fn deploy(&self, mode: FundMode, fresh: bool) -> Result<(Deployment, DeploySummary)> {
        let fees = FeeConfig::default();
        let manifest = Manifest::mock_fund(&MockFundParams {
            mode,
            fees,
            ..Default::default()
        })?;
        self.deployer()
            .run(&manifest, &DeployOptions { fresh, mode, fees })
            .await
    }
}
