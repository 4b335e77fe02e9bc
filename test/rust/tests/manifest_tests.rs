use std::fs;

use eyre::Result;
use fund_addresses::{FeeConfig, FundMode, FUND, PRICE_ORACLE, UNISWAP_INTEGRATION};
use fund_scripts::{
    config::Network,
    manifest::{Manifest, MockFundParams},
};

#[test]
fn test_builtin_manifest_loads_from_a_file() -> Result<()> {
    let manifest = Manifest::mock_fund(&MockFundParams::default())?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mock-fund.json");
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;

    assert_eq!(Manifest::load(&path)?, manifest);
    Ok(())
}

#[test]
fn test_builtin_deployment_order() -> Result<()> {
    let manifest = Manifest::mock_fund(&MockFundParams::for_network(
        Network::Localhost,
        FundMode::Oracle,
        FeeConfig::default(),
    ))?;
    let order = manifest
        .deployment_order()?
        .into_iter()
        .map(|spec| spec.name.as_str())
        .collect::<Vec<_>>();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();

    assert!(position(PRICE_ORACLE) < position(UNISWAP_INTEGRATION));
    assert!(position(UNISWAP_INTEGRATION) < position(FUND));
    assert_eq!(manifest.contract(FUND).unwrap().artifact(), "MockFund");
    Ok(())
}

#[test]
fn test_broken_manifest_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.json");
    fs::write(
        &path,
        serde_json::json!({
            "contracts": [
                { "name": "A", "artifact": "MockERC20", "args": ["$B"] },
                { "name": "B", "artifact": "MockERC20", "args": ["$A"] },
            ],
        })
        .to_string(),
    )?;

    let err = format!("{:?}", Manifest::load(&path).unwrap_err());
    assert!(err.contains("cycle"), "{}", err);
    Ok(())
}
