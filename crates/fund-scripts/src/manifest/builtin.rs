//! The manifest for the mock fund system: mock tokens, price feeds, the
//! oracle, the swap integration and the fund itself, wired together.

use ethers::types::U256;
use eyre::Result;
use fixed_point_macros::uint256;
use fund_addresses::{FeeConfig, FundMode, FUND, PRICE_ORACLE, SHARE_TOKEN, UNISWAP_INTEGRATION};
use fund_math::{allocate, FixedRate, Price};
use serde_json::{json, Value};

use super::{ContractSpec, Manifest, Step, TokenSpec};
use crate::{
    config::Network,
    constants::{MockToken, LIQUIDITY_MULTIPLE, MOCK_TOKENS, PRICE_FEED_DECIMALS},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockFundParams {
    pub mode: FundMode,
    pub fees: FeeConfig,
    /// USDC (raw, 6 decimals) the deployer seeds the fund with.
    pub initial_usdc: U256,
    /// Point the oracle at Chainlink's Sepolia feeds instead of deploying
    /// mock aggregators.
    pub chainlink_feeds: bool,
}

impl Default for MockFundParams {
    fn default() -> Self {
        Self {
            mode: FundMode::FixedRate,
            fees: FeeConfig::default(),
            initial_usdc: uint256!(100_000e6),
            chainlink_feeds: false,
        }
    }
}

impl MockFundParams {
    pub fn for_network(network: Network, mode: FundMode, fees: FeeConfig) -> Self {
        Self {
            mode,
            fees,
            chainlink_feeds: network == Network::Sepolia,
            ..Default::default()
        }
    }
}

/// The contract a mock token is deployed as.
pub fn token_contract(symbol: &str) -> String {
    format!("Mock{}", symbol)
}

fn feed_contract(symbol: &str) -> String {
    format!("{}PriceFeed", symbol)
}

fn reference(name: &str) -> Value {
    json!(format!("${}", name))
}

fn call(id: String, contract: &str, function: &str, args: Vec<Value>) -> Step {
    Step::Call {
        id,
        contract: contract.to_string(),
        function: function.to_string(),
        args,
    }
}

impl Manifest {
    pub fn mock_fund(params: &MockFundParams) -> Result<Manifest> {
        let usdc = token_contract("USDC");
        let tokens = MOCK_TOKENS.iter().collect::<Vec<_>>();
        let investable = tokens
            .iter()
            .filter(|token| token.symbol != "USDC")
            .copied()
            .collect::<Vec<&MockToken>>();

        let mut contracts = Vec::new();
        for token in &tokens {
            contracts.push(ContractSpec {
                name: token_contract(token.symbol),
                artifact: Some("MockERC20".to_string()),
                args: vec![json!(token.name), json!(token.symbol), json!(token.decimals)],
                token: Some(TokenSpec {
                    symbol: token.symbol.to_string(),
                    decimals: token.decimals,
                }),
            });
        }
        if !params.chainlink_feeds {
            for token in &tokens {
                contracts.push(ContractSpec {
                    name: feed_contract(token.symbol),
                    artifact: Some("MockV3Aggregator".to_string()),
                    args: vec![json!(PRICE_FEED_DECIMALS), json!(token.price.to_string())],
                    token: None,
                });
            }
        }
        contracts.push(ContractSpec {
            name: PRICE_ORACLE.to_string(),
            artifact: None,
            args: vec![],
            token: None,
        });
        contracts.push(ContractSpec {
            name: UNISWAP_INTEGRATION.to_string(),
            artifact: None,
            args: vec![reference(PRICE_ORACLE)],
            token: None,
        });
        contracts.push(ContractSpec {
            name: FUND.to_string(),
            artifact: Some(params.mode.fund_artifact().to_string()),
            args: vec![
                json!("Mock Fund Coin"),
                json!("MFC"),
                reference(PRICE_ORACLE),
                reference(UNISWAP_INTEGRATION),
                reference("deployer"),
                json!(params.fees.management_fee_bps),
            ],
            token: None,
        });

        let mut steps = Vec::new();
        for token in &tokens {
            let feed = if params.chainlink_feeds {
                json!(format!("{:?}", token.sepolia_feed))
            } else {
                reference(&feed_contract(token.symbol))
            };
            steps.push(call(
                format!("oracle.feed.{}", token.symbol),
                PRICE_ORACLE,
                "setPriceFeed",
                vec![reference(&token_contract(token.symbol)), feed],
            ));
        }
        if params.mode == FundMode::FixedRate {
            steps.push(call(
                "swap.fixed-rate-mode".to_string(),
                UNISWAP_INTEGRATION,
                "setFixedRateMode",
                vec![json!(true)],
            ));
            for token in &investable {
                let rate = FixedRate::from_price(&Price::new(token.price, PRICE_FEED_DECIMALS))?;
                steps.push(call(
                    format!("swap.rate.{}", token.symbol),
                    UNISWAP_INTEGRATION,
                    "setFixedRate",
                    vec![
                        reference(&token_contract(token.symbol)),
                        json!(rate.usdc_per_token.to_string()),
                    ],
                ));
            }
        }

        steps.push(call(
            "fund.usdc".to_string(),
            FUND,
            "setUSDCToken",
            vec![reference(&usdc)],
        ));
        for token in &investable {
            steps.push(call(
                format!("fund.token.{}", token.symbol),
                FUND,
                "addSupportedToken",
                vec![
                    reference(&token_contract(token.symbol)),
                    json!(token.allocation_bps),
                ],
            ));
        }

        // The integration pays out tokens when the fund buys them, so it
        // needs a multiple of each token's initial allocation.
        let weights = investable
            .iter()
            .map(|token| (token.symbol, token.allocation_bps))
            .collect::<Vec<_>>();
        let (allocations, _) = allocate(params.initial_usdc * LIQUIDITY_MULTIPLE, &weights)?;
        for (token, allocation) in investable.iter().zip(allocations) {
            let rate = FixedRate::from_price(&Price::new(token.price, PRICE_FEED_DECIMALS))?;
            let amount = rate.usdc_to_token(allocation.usdc, token.decimals)?;
            steps.push(call(
                format!("swap.liquidity.{}", token.symbol),
                &token_contract(token.symbol),
                "mint",
                vec![reference(UNISWAP_INTEGRATION), json!(amount.to_string())],
            ));
        }
        steps.push(call(
            "swap.liquidity.USDC".to_string(),
            &usdc,
            "mint",
            vec![
                reference(UNISWAP_INTEGRATION),
                json!((params.initial_usdc * LIQUIDITY_MULTIPLE).to_string()),
            ],
        ));

        let initial_usdc = json!(params.initial_usdc.to_string());
        steps.push(call(
            "fund.seed.mint".to_string(),
            &usdc,
            "mint",
            vec![reference("deployer"), initial_usdc.clone()],
        ));
        steps.push(call(
            "fund.seed.approve".to_string(),
            &usdc,
            "approve",
            vec![reference(FUND), initial_usdc.clone()],
        ));
        steps.push(call(
            "fund.init".to_string(),
            FUND,
            "initializeFund",
            vec![initial_usdc],
        ));
        steps.push(Step::Discover {
            id: "fund.share-token".to_string(),
            contract: FUND.to_string(),
            function: "shareToken".to_string(),
            record_as: SHARE_TOKEN.to_string(),
        });

        let manifest = Manifest { contracts, steps };
        manifest.validate()?;
        Ok(manifest)
    }
}
