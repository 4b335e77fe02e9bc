use ethers::contract::abigen;

// Rates are USDC base units (6 decimals) per whole token.
abigen!(
    UniswapIntegration,
    r#"[
        function setFixedRate(address token, uint256 rate) external
        function getFixedRate(address token) external view returns (uint256)
        function setFixedRateMode(bool enabled) external
        function fixedRateMode() external view returns (bool)
    ]"#,
    derives(serde::Deserialize, serde::Serialize)
);
