use std::env;

use ethers::types::{Address, U256};
use fixed_point_macros::uint256;

/// The mnemonic anvil and Hardhat nodes derive their funded accounts from.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Decimals of Chainlink USD feeds and of the mock aggregators standing in
/// for them.
pub const PRICE_FEED_DECIMALS: u8 = 8;

/// The integration is seeded with this many times the fund's initial
/// allocation of each token.
pub const LIQUIDITY_MULTIPLE: u64 = 10;

/// A token the built-in manifest deploys as a `MockERC20`.
#[derive(Clone, Debug)]
pub struct MockToken {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    /// USD price with `PRICE_FEED_DECIMALS` decimals. Seeds the mock feeds
    /// and the fixed rates.
    pub price: U256,
    /// Share of the fund's initial USDC allocated to the token.
    pub allocation_bps: u32,
    /// Chainlink's USD feed for the token on Sepolia.
    pub sepolia_feed: Address,
}

lazy_static! {
    pub static ref MOCK_TOKENS: Vec<MockToken> = vec![
        MockToken {
            symbol: "USDC",
            name: "Mock USDC",
            decimals: 6,
            price: uint256!(1e8),
            allocation_bps: 0,
            sepolia_feed: "0xA2F78ab2355fe2f984D808B5CeE7FD0A93D5270E".parse().unwrap(),
        },
        MockToken {
            symbol: "WETH",
            name: "Mock Wrapped Ether",
            decimals: 18,
            price: uint256!(2_000e8),
            allocation_bps: 4_000,
            sepolia_feed: "0x694AA1769357215DE4FAC081bf1f309aDC325306".parse().unwrap(),
        },
        MockToken {
            symbol: "WBTC",
            name: "Mock Wrapped Bitcoin",
            decimals: 8,
            price: uint256!(60_000e8),
            allocation_bps: 3_000,
            sepolia_feed: "0x1b44F3514812d835EB1BDB0acB33d3fA3351Ee43".parse().unwrap(),
        },
        MockToken {
            symbol: "LINK",
            name: "Mock Chainlink",
            decimals: 18,
            price: uint256!(15e8),
            allocation_bps: 1_500,
            sepolia_feed: "0xc59E3633BAAC79493d908e63626716e204A45EdF".parse().unwrap(),
        },
        MockToken {
            symbol: "DAI",
            name: "Mock Dai",
            decimals: 18,
            price: uint256!(1e8),
            allocation_bps: 1_000,
            sepolia_feed: "0x14866185B1962B63C3Ea9E03Bc1da838bab34C19".parse().unwrap(),
        },
    ];

    // The amount of fuzz runs that chain-backed fuzz tests use.
    pub static ref FUZZ_RUNS: u64 = env::var("FUND_FUZZ_RUNS").ok().and_then(|s| s.parse().ok()).unwrap_or(20);
}
