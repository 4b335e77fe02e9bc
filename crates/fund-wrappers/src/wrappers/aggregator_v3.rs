use ethers::contract::abigen;

// Chainlink's `AggregatorV3Interface`, also implemented by `MockV3Aggregator`.
abigen!(
    AggregatorV3,
    r#"[
        function decimals() external view returns (uint8)
        function description() external view returns (string)
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
    ]"#,
    derives(serde::Deserialize, serde::Serialize)
);
