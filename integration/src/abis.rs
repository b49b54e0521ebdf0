//! Views of the deployed contracts read by the tests

use alloy_sol_types::sol;

sol! {
    /// The dependency controller's registry of managed contracts
    interface IDependencyController {
        function allManagedContracts() external view returns (address[] memory);
    }

    /// Administrative ownership of a deployed contract
    interface IOwnable {
        function owner() external view returns (address);
    }
}
