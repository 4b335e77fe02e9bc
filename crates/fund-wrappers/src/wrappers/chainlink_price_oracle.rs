use ethers::contract::abigen;

abigen!(
    ChainlinkPriceOracle,
    r#"[
        function setPriceFeed(address token, address priceFeed) external
        function priceFeeds(address token) external view returns (address)
        function getLatestPrice(address token) external view returns (uint256)
    ]"#,
    derives(serde::Deserialize, serde::Serialize)
);
