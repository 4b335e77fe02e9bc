use ethers::contract::abigen;

// `MockFund` and `FixedRateMockFund` share this interface. USDC amounts carry
// 6 decimals and MFC amounts 18.
abigen!(
    MockFund,
    r#"[
        function invest(uint256 usdcAmount) external
        function redeem(uint256 mfcAmount) external
        function initializeFund(uint256 initialUSDCAmount) external
        function addSupportedToken(address token, uint256 allocation) external
        function setUSDCToken(address usdcToken) external
        function collectManagementFee() external
        function getSupportedTokens() external view returns (address[])
        function getFundStats() external view returns (uint256 nav, uint256 totalSupply, bool isInitialized)
        function calculateNAV() external view returns (uint256)
        function calculateMFCValue() external view returns (uint256)
        function getInvestmentPreview(uint256 usdcAmount) external view returns (uint256)
        function getRedemptionPreview(uint256 mfcAmount) external view returns (uint256)
        function shareToken() external view returns (address)
        function usdcToken() external view returns (address)
        function managementFeeRate() external view returns (uint256)
        function lastFeeCollection() external view returns (uint256)
        function minimumInvestment() external view returns (uint256)
        function minimumRedemption() external view returns (uint256)
        event Investment(address indexed investor, uint256 usdcAmount, uint256 mfcAmount)
        event Redemption(address indexed investor, uint256 mfcAmount, uint256 usdcAmount)
        event ManagementFeeCollected(uint256 feeShares, uint256 timestamp)
    ]"#,
    derives(serde::Deserialize, serde::Serialize)
);
