//! Definitions of Solidity functions called during deployment and wiring

use alloy_sol_types::sol;

sol! {
    /// The single point of authority owning every managed contract
    interface IDependencyController {
        function manageContract(
            address contr,
            uint256[] memory charactersPlayed,
            uint256[] memory rolesPlayed,
            address[] memory ownAsDelegate
        ) external;
        function allManagedContracts() external view returns (address[] memory);
        function executeAsOwner(address executable) external;
        function relinquishOwnership(address ownableContract, address newOwner) external;
    }

    /// Administrative ownership of a deployed contract
    interface IOwnable {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
    }

    /// The fund holding the protocol's assets
    interface IFund {
        function activeTokens(address token) external view returns (bool);
        function activateToken(address token) external;
    }

    /// Distributes MFI incentives across tranches
    interface IIncentiveDistribution {
        function trancheShare(uint256 tranche) external view returns (uint256);
        function initTranche(uint256 tranche, uint256 share) external;
    }
}
