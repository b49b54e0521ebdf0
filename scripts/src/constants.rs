//! Constants used in the deploy scripts

// ---------------
// | Permissions |
// ---------------

/// May withdraw funds held by the fund contract
pub const WITHDRAWER: u16 = 1;
/// May call margin calls on accounts
pub const MARGIN_CALLER: u16 = 2;
/// May borrow from the lending contract
pub const BORROWER: u16 = 3;
/// May open and modify margin positions
pub const MARGIN_TRADER: u16 = 4;
/// May be credited protocol fees
pub const FEE_SOURCE: u16 = 5;
/// May liquidate underwater accounts
pub const LIQUIDATOR: u16 = 6;
/// May trade on behalf of the fund
pub const AUTHORIZED_FUND_TRADER: u16 = 7;
/// May report incentive accruals
pub const INCENTIVE_REPORTER: u16 = 8;
/// May activate new tokens
pub const TOKEN_ACTIVATOR: u16 = 9;
/// May penalize stakers
pub const STAKE_PENALIZER: u16 = 10;

// --------------
// | Characters |
// --------------

/// The fund holding all protocol assets
pub const FUND: u16 = 101;
/// The lending pool
pub const LENDING: u16 = 102;
/// The margin router
pub const ROUTER: u16 = 103;
/// The cross margin trading engine
pub const MARGIN_TRADING: u16 = 104;
/// The fee controller
pub const FEE_CONTROLLER: u16 = 105;
/// The price controller
pub const PRICE_CONTROLLER: u16 = 106;
/// The protocol admin
pub const ADMIN: u16 = 107;
/// The incentive distribution contract
pub const INCENTIVE_DISTRIBUTION: u16 = 108;

// ----------------
// | Task catalog |
// ----------------

/// The roles registry task
pub const ROLES_TASK: &str = "Roles";
/// The dependency controller task, which becomes the single owner of managed contracts
pub const DEPENDENCY_CONTROLLER_TASK: &str = "DependencyController";
/// The test token standing in for the peg on non-live networks
pub const PEG_TASK: &str = "Peg";
/// The fund task
pub const FUND_TASK: &str = "Fund";
/// The incentive distribution task
pub const INCENTIVE_DISTRIBUTION_TASK: &str = "IncentiveDistribution";
/// The token activation migration
pub const TOKEN_ACTIVATION_TASK: &str = "TokenActivation";

/// Fees charged by the admin contract, in basis points
pub const FEES_PER_10K: u64 = 10;
/// The lending target portion used by the token admin, per mille
pub const LENDING_TARGET_PORTION: u64 = 400;
/// The borrowing target portion used by the token admin, per mille
pub const BORROWING_TARGET_PORTION: u64 = 300;
/// The share of MFI emissions routed through incentive distribution, per 10k
pub const INCENTIVE_DISTRIBUTION_SHARE: u64 = 4000;
/// Decimals used when scaling human-readable token parameters
pub const TOKEN_PARAM_DECIMALS: u8 = 18;
/// The liquidity mining tranche of the incentive distribution
pub const LIQUIDITY_MINING_TRANCHE: u64 = 0;
/// The liquidity mining tranche's share of incentives, per mille
pub const LIQUIDITY_MINING_SHARE: u64 = 200;
/// Decimals of the peg the snowglobe oracle prices against
pub const SNOWGLOBE_PEG_DECIMALS: u64 = 6;
/// How long lending incentives are paid out when no end is configured, in seconds
pub const LENDING_INCENTIVE_PERIOD_SECS: u64 = 3 * 30 * 24 * 60 * 60;

/// Exposure cap of the local peg token, in whole tokens
pub const LOCAL_PEG_EXPOSURE_CAP: u64 = 1_000_000;
/// Lending buffer of the local peg token, in whole tokens
pub const LOCAL_PEG_LENDING_BUFFER: u64 = 10_000;
/// Incentive weight of the local peg token
pub const LOCAL_PEG_INCENTIVE_WEIGHT: u64 = 5;

// --------------------
// | Files & defaults |
// --------------------

/// The default deployments file
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";
/// The default deploy config file
pub const DEFAULT_CONFIG_PATH: &str = "deploy.config.json";
/// The default directory holding compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
/// The fixed output path of `export-addresses`
pub const DEFAULT_EXPORT_PATH: &str = "deployed-contract-addresses.json";
/// The suffix of the lock file guarding a deployments file
pub const LOCK_FILE_SUFFIX: &str = "lock";
/// The suffix of the temporary file written before an atomic rename
pub const TMP_FILE_SUFFIX: &str = "tmp";
/// The extension of a compiled artifact file
pub const ARTIFACT_EXTENSION: &str = "json";
