use ethers::{providers::Middleware, signers::Signer};
use eyre::{eyre, Result};
use fixed_point::FixedPoint;
use fixed_point_macros::{fixed, uint256};
use fund_addresses::{FundMode, FUND};
use fund_math::{SECONDS_PER_YEAR, SHARE_DECIMALS, USDC_DECIMALS};
use fund_scripts::{
    agent::Investor,
    config::dev_account,
    constants::FUZZ_RUNS,
    inspect::{fund_state, inspect_fund, verify_previews},
};
use fund_wrappers::wrappers::mock_fund::MockFund;
use rand::{thread_rng, Rng};

use crate::common::TestEnv;

#[ignore]
#[tokio::test]
async fn test_round_trip() -> Result<()> {
    let env = TestEnv::new().await?;
    let (deployment, _) = env.deploy(FundMode::FixedRate, false).await?;
    let investor = Investor::new(env.client.clone(), deployment)?;

    let amount = uint256!(1_000e6);
    investor.top_up(amount).await?;
    let round_trip = investor.round_trip(amount).await?;

    assert_eq!(round_trip.invest.usdc_in, amount);
    assert!(round_trip.redeem.usdc_out <= amount);
    assert!(round_trip.passes(fixed!(0.95e18)));
    assert_eq!(
        round_trip.invest.after.mfc - round_trip.invest.before.mfc,
        round_trip.invest.shares_out
    );

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_fuzz_round_trips_never_profit() -> Result<()> {
    let env = TestEnv::new().await?;
    let (deployment, _) = env.deploy(FundMode::FixedRate, false).await?;
    let investor = Investor::new(env.client.clone(), deployment)?;

    let mut rng = thread_rng();
    for _ in 0..*FUZZ_RUNS {
        let amount = rng.gen_range(fixed!(10e18)..=fixed!(50_000e18));
        let amount = amount.to_units(USDC_DECIMALS)?;
        investor.top_up(amount).await?;
        let round_trip = investor.round_trip(amount).await?;
        assert!(
            round_trip.redeem.usdc_out <= amount,
            "round trip of {} returned {}",
            amount,
            round_trip.redeem.usdc_out
        );
    }

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_previews_match_the_math() -> Result<()> {
    let env = TestEnv::new().await?;
    let (deployment, _) = env.deploy(FundMode::FixedRate, false).await?;

    let check = verify_previews(env.client.clone(), &deployment, uint256!(2_500e6)).await?;
    // A base unit of USDC.
    assert!(check.within(FixedPoint::from(uint256!(1e12))), "{}", check);

    let report = inspect_fund(env.client.clone(), &deployment).await?;
    assert!(report.initialized);
    assert!(!report.holdings.is_empty());

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_management_fee_accrues_like_the_math() -> Result<()> {
    let env = TestEnv::new().await?;
    let (deployment, _) = env.deploy(FundMode::FixedRate, false).await?;
    let fund = MockFund::new(deployment.contract(FUND)?, env.client.clone());
    let snapshot = env.chain.snapshot().await?;

    let state = fund_state(env.client.clone(), &deployment).await?;
    env.chain.increase_time(SECONDS_PER_YEAR / 12).await?;
    let receipt = fund
        .collect_management_fee()
        .send()
        .await?
        .await?
        .ok_or_else(|| eyre!("collectManagementFee was dropped"))?;
    let block = env
        .client
        .get_block(receipt.block_number.ok_or_else(|| eyre!("receipt has no block"))?)
        .await?
        .ok_or_else(|| eyre!("block not found"))?;

    let expected = state.accrued_management_fee_shares(block.timestamp.low_u64())?;
    let (_, supply, _) = fund.get_fund_stats().call().await?;
    let minted = FixedPoint::from_units(supply, SHARE_DECIMALS)? - state.total_supply;
    assert!(
        minted.abs_diff(expected) <= expected.mul_down(fixed!(0.01e18)),
        "minted {} expected {}",
        minted,
        expected
    );

    // Reverting undoes the collection.
    env.chain.revert(snapshot).await?;
    let (_, supply, _) = fund.get_fund_stats().call().await?;
    assert_eq!(FixedPoint::from_units(supply, SHARE_DECIMALS)?, state.total_supply);

    Ok(())
}

#[ignore]
#[tokio::test]
async fn test_second_investor() -> Result<()> {
    let env = TestEnv::new().await?;
    let (deployment, _) = env.deploy(FundMode::FixedRate, false).await?;

    let wallet = dev_account(1)?;
    env.chain.deal(wallet.address(), uint256!(1e18)).await?;
    let investor = Investor::new(env.chain.client(wallet).await?, deployment)?;

    let amount = uint256!(250e6);
    assert!(investor.top_up(amount).await?);
    // Already topped up.
    assert!(!investor.top_up(amount).await?);
    let outcome = investor.invest(amount).await?;
    assert_eq!(outcome.after.usdc, outcome.before.usdc - amount);
    assert!(outcome.shares_out > uint256!(0));

    Ok(())
}
