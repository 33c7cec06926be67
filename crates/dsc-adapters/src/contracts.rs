//! Contract interfaces the client calls.

use alloy::sol;

sol! {
    interface IDSCEngine {
        function getAccountInformation(address user)
            external
            view
            returns (uint256 totalDscMinted, uint256 collateralValueInUsd);
        function getHealthFactor(address user) external view returns (uint256);
        function getCollateralTokens() external view returns (address[] memory);
        function getCollateralBalanceOfUser(address user, address token) external view returns (uint256);

        function depositCollateral(address tokenCollateralAddress, uint256 amountCollateral) external;
        function mintDsc(uint256 amountDscToMint) external;
        function depositCollateralAndMintDsc(
            address tokenCollateralAddress,
            uint256 amountCollateral,
            uint256 amountDscToMint
        ) external;
        function redeemCollateral(address tokenCollateralAddress, uint256 amountCollateral) external;
        function redeemCollateralForDsc(
            address tokenCollateralAddress,
            uint256 amountCollateral,
            uint256 amountDscToBurn
        ) external;
        function burnDsc(uint256 amount) external;
        function liquidate(address collateral, address user, uint256 debtToCover) external;
    }

    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}
