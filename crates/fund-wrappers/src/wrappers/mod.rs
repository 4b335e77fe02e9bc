pub mod aggregator_v3;
pub mod chainlink_price_oracle;
pub mod mock_erc20;
pub mod mock_fund;
pub mod uniswap_integration;
