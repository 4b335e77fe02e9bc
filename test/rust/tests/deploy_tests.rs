use eyre::Result;
use fund_addresses::{Deployment, FeeConfig, FundMode, FUND, SHARE_TOKEN, USDC};
use fund_scripts::constants::MOCK_TOKENS;

use crate::common::TestEnv;

#[ignore]
#[tokio::test]
async fn test_deploy_is_idempotent() -> Result<()> {
    let env = TestEnv::new().await?;

    let (deployment, summary) = env.deploy(FundMode::FixedRate, false).await?;
    assert!(summary.reused.is_empty());
    assert!(summary.steps_skipped.is_empty());
    assert!(summary.record.exists());
    assert!(deployment.contracts.contains_key(FUND));
    assert!(deployment.contracts.contains_key(SHARE_TOKEN));
    for token in MOCK_TOKENS.iter() {
        deployment.token(token.symbol)?;
    }

    // Nothing is sent the second time around.
    let (again, summary) = env.deploy(FundMode::FixedRate, false).await?;
    assert!(summary.deployed.is_empty());
    assert!(summary.steps_run.is_empty());
    assert_eq!(again.contracts, deployment.contracts);
    assert_eq!(again.completed_steps, deployment.completed_steps);

    // The record on disk is what the run returned.
    assert_eq!(env.store().require("hardhat")?, again);

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_record_from_another_chain_is_rejected() -> Result<()> {
    let env = TestEnv::new().await?;
    let mut foreign = Deployment::new(
        "hardhat",
        1,
        env.client.address(),
        FundMode::FixedRate,
        FeeConfig::default(),
    );
    foreign.set_token(USDC, ethers::types::Address::repeat_byte(1));
    env.store().save(&foreign)?;

    let err = env.deploy(FundMode::FixedRate, false).await.unwrap_err();
    assert!(err.to_string().contains("--fresh"));

    // Starting over ignores the old record.
    let (deployment, _) = env.deploy(FundMode::FixedRate, true).await?;
    assert_ne!(deployment.token(USDC)?, ethers::types::Address::repeat_byte(1));
    assert_eq!(deployment.chain_id, env.chain.chain_id());

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_mode_switch_requires_fresh() -> Result<()> {
    let env = TestEnv::new().await?;
    env.deploy(FundMode::FixedRate, false).await?;

    let err = env.deploy(FundMode::Oracle, false).await.unwrap_err();
    assert!(err.to_string().contains("--fresh"));

    let (deployment, summary) = env.deploy(FundMode::Oracle, true).await?;
    assert_eq!(deployment.mode, FundMode::Oracle);
    assert!(summary.reused.is_empty());

    Ok(())
}
