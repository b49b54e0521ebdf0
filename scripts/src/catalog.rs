//! The protocol's deploy tasks and their constructor arguments

use std::time::{SystemTime, UNIX_EPOCH};

use alloy::dyn_abi::DynSolValue;
use alloy_primitives::{keccak256, Address, B256, U256};
use serde::Deserialize;

use crate::{
    config::{scale_units, NetworkContext},
    constants::{
        ADMIN, AUTHORIZED_FUND_TRADER, BORROWER, BORROWING_TARGET_PORTION,
        DEPENDENCY_CONTROLLER_TASK, FEES_PER_10K, FEE_CONTROLLER, FUND, FUND_TASK,
        INCENTIVE_DISTRIBUTION, INCENTIVE_DISTRIBUTION_SHARE, INCENTIVE_DISTRIBUTION_TASK,
        INCENTIVE_REPORTER, LENDING, LENDING_INCENTIVE_PERIOD_SECS, LENDING_TARGET_PORTION,
        LIQUIDITY_MINING_SHARE, LIQUIDITY_MINING_TRANCHE, LOCAL_PEG_EXPOSURE_CAP,
        LOCAL_PEG_INCENTIVE_WEIGHT, LOCAL_PEG_LENDING_BUFFER, MARGIN_TRADER, MARGIN_TRADING,
        PEG_TASK, ROLES_TASK, ROUTER, SNOWGLOBE_PEG_DECIMALS, STAKE_PENALIZER,
        TOKEN_ACTIVATION_TASK, TOKEN_ACTIVATOR, TOKEN_PARAM_DECIMALS, WITHDRAWER,
    },
    errors::ScriptError,
    planner::TaskGraph,
    types::{ArgsContext, Capability, ConstructorArgs, PostDeployAction, TaskSpec, WiringStep},
};

/// The contracts registered with the dependency controller
const MANAGED_TASKS: [&str; 8] = [
    "Admin",
    "CrossMarginTrading",
    FUND_TASK,
    INCENTIVE_DISTRIBUTION_TASK,
    "Lending",
    "LiquidityMiningReward",
    "MarginRouter",
    "TokenAdmin",
];

/// All deploy tasks of the protocol on the given network
pub fn protocol_tasks(network: &NetworkContext) -> Vec<TaskSpec> {
    let mut controller_deps = vec![ROLES_TASK];
    controller_deps.extend(MANAGED_TASKS);

    // Tasks reading the peg wait for the local test token when it stands in
    let with_peg = |deps: &[&'static str]| -> Vec<&'static str> {
        let mut deps = deps.to_vec();
        if uses_local_peg(network) {
            deps.push(PEG_TASK);
        }
        deps
    };
    let migration_deps = [ROLES_TASK, DEPENDENCY_CONTROLLER_TASK, TOKEN_ACTIVATION_TASK];

    vec![
        TaskSpec::new(ROLES_TASK, no_args),
        TaskSpec::new(PEG_TASK, peg_args).with_artifact("ERC20PresetMinterPauser"),
        TaskSpec::new(FUND_TASK, weth_and_roles).depends_on(&[ROLES_TASK]),
        TaskSpec::new("Admin", admin_args).depends_on(&[ROLES_TASK]),
        TaskSpec::new("CrossMarginTrading", cross_margin_args)
            .depends_on(&with_peg(&[ROLES_TASK])),
        TaskSpec::new("Lending", roles_only).depends_on(&[ROLES_TASK]),
        TaskSpec::new("MarginRouter", weth_and_roles).depends_on(&[ROLES_TASK]),
        TaskSpec::new("TokenAdmin", token_admin_args).depends_on(&[ROLES_TASK]),
        TaskSpec::new(INCENTIVE_DISTRIBUTION_TASK, incentive_distribution_args)
            .depends_on(&[ROLES_TASK, FUND_TASK])
            .then_call(PostDeployAction::ActivateToken {
                fund: FUND_TASK.to_string(),
                token: "mfi".to_string(),
            }),
        TaskSpec::new("LiquidityMiningReward", liquidity_mining_args)
            .depends_on(&[INCENTIVE_DISTRIBUTION_TASK])
            .then_call(PostDeployAction::InitTranche {
                distribution: INCENTIVE_DISTRIBUTION_TASK.to_string(),
                tranche: LIQUIDITY_MINING_TRANCHE,
                share: LIQUIDITY_MINING_SHARE,
            }),
        TaskSpec::new(DEPENDENCY_CONTROLLER_TASK, roles_only)
            .depends_on(&controller_deps)
            .wiring(managed_contracts())
            .hands_over(&[ROLES_TASK]),
        TaskSpec::new("Staking", staking_args).depends_on(&[ROLES_TASK]),
        TaskSpec::new("MFIStaking", mfi_and_roles).depends_on(&[ROLES_TASK]),
        TaskSpec::new("SpotRouter", weth_only),
        TaskSpec::new("CrossMarginLiquidationV2", roles_only).depends_on(&[ROLES_TASK]),
        TaskSpec::new("SnowglobeOracle", oracle_args).depends_on(&[ROLES_TASK]),
        TaskSpec::new(TOKEN_ACTIVATION_TASK, token_activation_args)
            .depends_on(&with_peg(&[ROLES_TASK, DEPENDENCY_CONTROLLER_TASK]))
            .one_shot(),
        TaskSpec::new("IncentivizeLending", incentivize_lending_args)
            .depends_on(&[ROLES_TASK, DEPENDENCY_CONTROLLER_TASK])
            .one_shot()
            .at_end(),
        TaskSpec::new("LendingMigration", lending_migration_args)
            .depends_on(&migration_deps)
            .one_shot(),
        TaskSpec::new("MarginHoldingsMigration", margin_holdings_migration_args)
            .depends_on(&migration_deps)
            .one_shot(),
        TaskSpec::new("MarginLoansMigration", margin_loans_migration_args)
            .depends_on(&[
                ROLES_TASK,
                DEPENDENCY_CONTROLLER_TASK,
                TOKEN_ACTIVATION_TASK,
                "LendingMigration",
                "MarginHoldingsMigration",
            ])
            .one_shot(),
    ]
}

/// The protocol's task graph on the given network
pub fn task_graph(network: &NetworkContext) -> Result<TaskGraph, ScriptError> {
    TaskGraph::new(protocol_tasks(network))
}

/// Whether the peg is the locally deployed test token: on non-live networks
/// that do not name a `peg`
pub fn uses_local_peg(network: &NetworkContext) -> bool {
    !network.is_live && !network.named_constants.contains_key("peg")
}

/// The characters and roles each managed contract plays
fn managed_contracts() -> Vec<WiringStep> {
    use Capability::{Character, Role};

    vec![
        WiringStep::grant(Character(ADMIN), "Admin"),
        WiringStep::grant(Character(FEE_CONTROLLER), "Admin"),
        WiringStep::grant(Character(MARGIN_TRADING), "CrossMarginTrading"),
        WiringStep::grant(Role(WITHDRAWER), "CrossMarginTrading"),
        WiringStep::grant(Role(AUTHORIZED_FUND_TRADER), "CrossMarginTrading"),
        WiringStep::grant(Role(STAKE_PENALIZER), "CrossMarginTrading"),
        WiringStep::grant(Character(FUND), FUND_TASK),
        WiringStep::grant(Character(INCENTIVE_DISTRIBUTION), INCENTIVE_DISTRIBUTION_TASK),
        WiringStep::grant(Character(LENDING), "Lending"),
        WiringStep::grant(Role(WITHDRAWER), "Lending"),
        WiringStep::grant(Role(INCENTIVE_REPORTER), "Lending"),
        WiringStep::grant(Role(INCENTIVE_REPORTER), "LiquidityMiningReward"),
        WiringStep::grant(Character(ROUTER), "MarginRouter"),
        WiringStep::grant(Role(WITHDRAWER), "MarginRouter"),
        WiringStep::grant(Role(MARGIN_TRADER), "MarginRouter"),
        WiringStep::grant(Role(BORROWER), "MarginRouter"),
        WiringStep::grant(Role(INCENTIVE_REPORTER), "MarginRouter"),
        WiringStep::delegated(Role(TOKEN_ACTIVATOR), "TokenAdmin", INCENTIVE_DISTRIBUTION_TASK),
    ]
}

// ---------------------
// | Argument builders |
// ---------------------

/// A `uint256` argument
fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

/// An `address[]` argument
fn address_array(addrs: impl IntoIterator<Item = Address>) -> DynSolValue {
    DynSolValue::Array(addrs.into_iter().map(DynSolValue::Address).collect())
}

/// A `uint256[]` argument
fn uint_array(values: impl IntoIterator<Item = U256>) -> DynSolValue {
    DynSolValue::Array(values.into_iter().map(|v| DynSolValue::Uint(v, 256)).collect())
}

/// No constructor arguments
fn no_args(_: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![])
}

/// `(roles)`
fn roles_only(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![DynSolValue::Address(ctx.dependency(ROLES_TASK)?)])
}

/// `(weth)`
fn weth_only(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![DynSolValue::Address(ctx.network.address("weth")?)])
}

/// `(mfi, roles)`
fn mfi_and_roles(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        DynSolValue::Address(ctx.network.address("mfi")?),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(stakeToken, rewardToken, legacyStaking)`, staking and rewarding MFI
fn staking_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    let mfi = ctx.network.address("mfi")?;
    Ok(vec![
        DynSolValue::Address(mfi),
        DynSolValue::Address(mfi),
        DynSolValue::Address(ctx.network.address("legacyStaking")?),
    ])
}

/// `(pegDecimals, roles)`
fn oracle_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        uint(SNOWGLOBE_PEG_DECIMALS),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(weth, roles)`
fn weth_and_roles(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        DynSolValue::Address(ctx.network.address("weth")?),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(name, symbol)` of the local test peg token
fn peg_args(_: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        DynSolValue::String("TestToken".to_string()),
        DynSolValue::String("TT".to_string()),
    ])
}

/// `(feesPer10k, mfi, lockedMfi, lockedMfiDelegate, roles)`
fn admin_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        uint(FEES_PER_10K),
        DynSolValue::Address(ctx.network.address("mfi")?),
        DynSolValue::Address(ctx.network.address("lockedMfi")?),
        DynSolValue::Address(ctx.network.address("lockedMfiDelegate")?),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// The peg token: the `peg` constant, or the test token deployed in its place
fn peg_address(ctx: &ArgsContext<'_>) -> Result<Address, ScriptError> {
    if uses_local_peg(ctx.network) {
        ctx.dependency(PEG_TASK)
    } else {
        ctx.network.address("peg")
    }
}

/// `(peg, roles)`
fn cross_margin_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        DynSolValue::Address(peg_address(ctx)?),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(lendingTargetPortion, borrowingTargetPortion, roles)`
fn token_admin_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        uint(LENDING_TARGET_PORTION),
        uint(BORROWING_TARGET_PORTION),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(mfi, share, roles)`
fn incentive_distribution_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    Ok(vec![
        DynSolValue::Address(ctx.network.address("mfi")?),
        uint(INCENTIVE_DISTRIBUTION_SHARE),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// `(incentiveDistribution, liquidityToken, startTimestamp)`
///
/// The start defaults to the current time unless `liquidityMiningStart` is set
fn liquidity_mining_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    let start = if ctx.network.named_constants.contains_key("liquidityMiningStart") {
        ctx.network.uint("liquidityMiningStart")?
    } else {
        U256::from(unix_now()?)
    };

    Ok(vec![
        DynSolValue::Address(ctx.dependency("IncentiveDistribution")?),
        DynSolValue::Address(ctx.network.address("liquidityToken")?),
        DynSolValue::Uint(start, 256),
    ])
}

/// Activation parameters of a single token, read from the `activationTokens`
/// named constant
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenParams {
    /// The token address
    pub address: Address,
    /// The maximum exposure, in whole tokens
    pub exposure_cap: u64,
    /// The lending buffer, in whole tokens
    pub lending_buffer: u64,
    /// The incentive weight
    pub incentive_weight: u64,
    /// The swap path used to liquidate the token, `[token, peg]` if absent
    #[serde(default)]
    pub liquidation_path: Option<Vec<Address>>,
}

impl TokenParams {
    /// The parameters activating the local test peg
    fn local_peg(peg: Address) -> Self {
        Self {
            address: peg,
            exposure_cap: LOCAL_PEG_EXPOSURE_CAP,
            lending_buffer: LOCAL_PEG_LENDING_BUFFER,
            incentive_weight: LOCAL_PEG_INCENTIVE_WEIGHT,
            liquidation_path: None,
        }
    }
}

/// `(roles, tokens, exposureCaps, lendingBuffers, incentiveWeights,
/// liquidationPairs, liquidationTokens)`
///
/// Non-live networks without `activationTokens` activate only the peg
fn token_activation_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    let peg = peg_address(ctx)?;
    let tokens: Vec<TokenParams> = if !ctx.network.is_live
        && !ctx.network.named_constants.contains_key("activationTokens")
    {
        vec![TokenParams::local_peg(peg)]
    } else {
        ctx.network.constant_as("activationTokens")?
    };
    let factory = ctx.network.address("uniswapFactory")?;
    let init_code_hash: B256 = ctx.network.constant_as("uniswapInitCodeHash")?;

    let paths: Vec<Vec<Address>> = tokens
        .iter()
        .map(|t| {
            t.liquidation_path
                .clone()
                .unwrap_or_else(|| vec![t.address, peg])
        })
        .collect();
    let pairs: Vec<Vec<Address>> = paths
        .iter()
        .map(|path| path_to_pairs(factory, init_code_hash, path))
        .collect();

    let scaled = |amounts: Vec<u64>| -> Result<Vec<U256>, ScriptError> {
        amounts
            .into_iter()
            .map(|amount| scale_units(amount, TOKEN_PARAM_DECIMALS))
            .collect()
    };

    Ok(vec![
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
        address_array(tokens.iter().map(|t| t.address)),
        uint_array(scaled(tokens.iter().map(|t| t.exposure_cap).collect())?),
        uint_array(scaled(tokens.iter().map(|t| t.lending_buffer).collect())?),
        uint_array(tokens.iter().map(|t| U256::from(t.incentive_weight))),
        DynSolValue::Array(pairs.into_iter().map(address_array).collect()),
        DynSolValue::Array(paths.into_iter().map(address_array).collect()),
    ])
}

/// The lending incentives paid out by `IncentivizeLending`, read from the
/// `lendingIncentives` named constant
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingIncentives {
    /// The total paid out, in whole MFI
    pub total: u64,
    /// The tokens whose lenders are paid, and their share of the total
    pub weights: Vec<TokenWeight>,
    /// When the payout ends, a fixed period from now if absent
    #[serde(default)]
    pub end_timestamp: Option<u64>,
}

/// A token's weight in the lending incentives
#[derive(Clone, Debug, Deserialize)]
pub struct TokenWeight {
    /// The token address
    pub token: Address,
    /// The token's weight
    pub weight: u64,
}

/// `(tokens, amounts, endTimestamp, roles)`
///
/// The total is split across the tokens pro rata to their weights
fn incentivize_lending_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    let incentives: LendingIncentives = ctx.network.constant_as("lendingIncentives")?;
    let total_weight: u64 = incentives.weights.iter().map(|w| w.weight).sum();
    if total_weight == 0 {
        return Err(ScriptError::config(
            "named constant `lendingIncentives` has no weighted tokens",
        ));
    }

    let total = scale_units(incentives.total, TOKEN_PARAM_DECIMALS)?;
    let amounts = incentives
        .weights
        .iter()
        .map(|w| total * U256::from(w.weight) / U256::from(total_weight));
    let end = match incentives.end_timestamp {
        Some(end) => end,
        None => unix_now()? + LENDING_INCENTIVE_PERIOD_SECS,
    };

    Ok(vec![
        address_array(incentives.weights.iter().map(|w| w.token)),
        uint_array(amounts),
        uint(end),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// The balances moved by a migration, read from a named constant
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationParams {
    /// The contract balances are migrated from
    #[serde(default)]
    pub legacy_contract: Address,
    /// The migrated balances
    #[serde(default)]
    pub balances: Vec<MigratedBalance>,
}

/// A single account's balance of a single token
#[derive(Clone, Debug, Deserialize)]
pub struct MigratedBalance {
    /// The account holding the balance
    pub account: Address,
    /// The token
    pub token: Address,
    /// The amount, in the token's base units
    pub amount: U256,
}

/// `(legacyContract, accounts, tokens, amounts, roles)` from `constant`
fn migration_args(ctx: &ArgsContext<'_>, constant: &str) -> Result<ConstructorArgs, ScriptError> {
    let params: MigrationParams = ctx.network.constant_as(constant)?;
    Ok(vec![
        DynSolValue::Address(params.legacy_contract),
        address_array(params.balances.iter().map(|b| b.account)),
        address_array(params.balances.iter().map(|b| b.token)),
        uint_array(params.balances.iter().map(|b| b.amount)),
        DynSolValue::Address(ctx.dependency(ROLES_TASK)?),
    ])
}

/// Lenders' bonds moved out of the legacy lending contract
fn lending_migration_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    migration_args(ctx, "lendingMigration")
}

/// Margin account holdings moved out of the legacy trading contract
fn margin_holdings_migration_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    migration_args(ctx, "marginHoldingsMigration")
}

/// Margin account loans moved out of the legacy trading contract
fn margin_loans_migration_args(ctx: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
    migration_args(ctx, "marginLoansMigration")
}

/// The current unix time in seconds
fn unix_now() -> Result<u64, ScriptError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.as_secs())
        .map_err(ScriptError::config)
}

/// The CREATE2 address of the AMM pair of two tokens
pub fn pair_address(factory: Address, init_code_hash: B256, a: Address, b: Address) -> Address {
    let (token0, token1) = if a < b { (a, b) } else { (b, a) };
    let mut packed = Vec::with_capacity(40);
    packed.extend_from_slice(token0.as_slice());
    packed.extend_from_slice(token1.as_slice());
    factory.create2(keccak256(packed), init_code_hash)
}

/// The pairs traversed by a swap path
fn path_to_pairs(factory: Address, init_code_hash: B256, path: &[Address]) -> Vec<Address> {
    path.windows(2)
        .map(|hop| pair_address(factory, init_code_hash, hop[0], hop[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use alloy_primitives::{address, b256};
    use serde_json::json;

    use super::*;
    use crate::planner::plan;

    const UNI_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
    const UNI_INIT_CODE_HASH: B256 =
        b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");

    /// A live network naming the peg
    fn live_network() -> NetworkContext {
        let mut network = NetworkContext::local("mainnet").with_constant("peg", USDT.to_string());
        network.is_live = true;
        network
    }

    fn ctx<'a>(
        task: &'a str,
        deps: &'a BTreeMap<String, Address>,
        network: &'a NetworkContext,
    ) -> ArgsContext<'a> {
        ArgsContext {
            task,
            dependencies: deps,
            network,
            deployer: Address::ZERO,
        }
    }

    #[test]
    fn test_every_task_plans() {
        for network in [NetworkContext::local("localhost"), live_network()] {
            let graph = task_graph(&network).unwrap();
            for name in graph.names() {
                assert!(plan(name, &graph).is_ok(), "{name} does not plan");
            }
        }
    }

    #[test]
    fn test_controller_comes_after_managed_contracts() {
        let graph = task_graph(&NetworkContext::local("kovan")).unwrap();
        let order: Vec<_> = plan(TOKEN_ACTIVATION_TASK, &graph)
            .unwrap()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();

        assert_eq!(order.first(), Some(&ROLES_TASK));
        assert_eq!(order.last(), Some(&TOKEN_ACTIVATION_TASK));
        let controller = order
            .iter()
            .position(|t| *t == DEPENDENCY_CONTROLLER_TASK)
            .unwrap();
        for managed in MANAGED_TASKS {
            let pos = order.iter().position(|t| *t == managed).unwrap();
            assert!(pos < controller, "{managed} planned after the controller");
        }
    }

    #[test]
    fn test_peg_is_deployed_only_where_no_peg_is_named() {
        fn position(order: &[&TaskSpec], name: &str) -> Option<usize> {
            order.iter().position(|t| t.name == name)
        }

        let local = task_graph(&NetworkContext::local("kovan")).unwrap();
        let order = plan(TOKEN_ACTIVATION_TASK, &local).unwrap();
        let peg = position(&order, PEG_TASK).unwrap();
        assert!(peg < position(&order, "CrossMarginTrading").unwrap());
        let activation = local.get(TOKEN_ACTIVATION_TASK).unwrap();
        assert!(activation.dependencies.iter().any(|d| d == PEG_TASK));

        let live = task_graph(&live_network()).unwrap();
        assert_eq!(position(&plan(TOKEN_ACTIVATION_TASK, &live).unwrap(), PEG_TASK), None);

        // A named peg wins off live networks too
        let named = NetworkContext::local("kovan").with_constant("peg", USDT.to_string());
        let graph = task_graph(&named).unwrap();
        assert_eq!(position(&plan(TOKEN_ACTIVATION_TASK, &graph).unwrap(), PEG_TASK), None);
    }

    #[test]
    fn test_local_peg_is_read_from_its_deployment() {
        let network = NetworkContext::local("localhost")
            .with_constant("uniswapFactory", UNI_FACTORY.to_string())
            .with_constant("uniswapInitCodeHash", UNI_INIT_CODE_HASH.to_string());
        let peg = Address::repeat_byte(0xee);
        let roles = Address::repeat_byte(7);
        let deps = BTreeMap::from([
            (ROLES_TASK.to_string(), roles),
            (PEG_TASK.to_string(), peg),
        ]);

        let args = cross_margin_args(&ctx("CrossMarginTrading", &deps, &network)).unwrap();
        assert_eq!(args, [DynSolValue::Address(peg), DynSolValue::Address(roles)]);

        // Only the peg itself is activated
        let args = token_activation_args(&ctx(TOKEN_ACTIVATION_TASK, &deps, &network)).unwrap();
        assert_eq!(args[1], address_array([peg]));
        assert_eq!(
            args[2],
            uint_array([scale_units(LOCAL_PEG_EXPOSURE_CAP, TOKEN_PARAM_DECIMALS).unwrap()])
        );
        assert_eq!(args[4], uint_array([U256::from(LOCAL_PEG_INCENTIVE_WEIGHT)]));
        assert_eq!(args[6], DynSolValue::Array(vec![address_array([peg, peg])]));
    }

    #[test]
    fn test_live_network_requires_named_peg() {
        let mut network = NetworkContext::local("mainnet");
        network.is_live = true;
        let deps = BTreeMap::from([
            (ROLES_TASK.to_string(), Address::ZERO),
            (PEG_TASK.to_string(), Address::repeat_byte(0xee)),
        ]);
        assert!(matches!(
            cross_margin_args(&ctx("CrossMarginTrading", &deps, &network)),
            Err(ScriptError::Configuration(msg)) if msg.contains("peg")
        ));
    }

    #[test]
    fn test_lending_incentives_split_pro_rata() {
        let network = NetworkContext::local("localhost").with_constant(
            "lendingIncentives",
            json!({
                "total": 25000,
                "endTimestamp": 1_700_000_000u64,
                "weights": [
                    { "token": USDT.to_string(), "weight": 3 },
                    { "token": USDC.to_string(), "weight": 3 },
                    { "token": WETH.to_string(), "weight": 2 }
                ]
            }),
        );
        let roles = Address::repeat_byte(7);
        let deps = BTreeMap::from([(ROLES_TASK.to_string(), roles)]);

        let args = incentivize_lending_args(&ctx("IncentivizeLending", &deps, &network)).unwrap();
        let ether = |n: u64| scale_units(n, TOKEN_PARAM_DECIMALS).unwrap();
        assert_eq!(args[0], address_array([USDT, USDC, WETH]));
        assert_eq!(args[1], uint_array([ether(9375), ether(9375), ether(6250)]));
        assert_eq!(args[2], uint(1_700_000_000));
        assert_eq!(args[3], DynSolValue::Address(roles));
    }

    #[test]
    fn test_lending_incentives_need_weights() {
        let network = NetworkContext::local("localhost")
            .with_constant("lendingIncentives", json!({ "total": 100, "weights": [] }));
        let deps = BTreeMap::from([(ROLES_TASK.to_string(), Address::ZERO)]);
        assert!(matches!(
            incentivize_lending_args(&ctx("IncentivizeLending", &deps, &network)),
            Err(ScriptError::Configuration(_))
        ));
    }

    #[test]
    fn test_migration_args() {
        let legacy = Address::repeat_byte(0x1e);
        let account = Address::repeat_byte(0xac);
        let network = NetworkContext::local("localhost")
            .with_constant(
                "lendingMigration",
                json!({
                    "legacyContract": legacy.to_string(),
                    "balances": [
                        { "account": account.to_string(), "token": WETH.to_string(), "amount": "1000000000000000000" }
                    ]
                }),
            )
            .with_constant("marginHoldingsMigration", json!({}));
        let roles = Address::repeat_byte(7);
        let deps = BTreeMap::from([(ROLES_TASK.to_string(), roles)]);

        let args = lending_migration_args(&ctx("LendingMigration", &deps, &network)).unwrap();
        assert_eq!(
            args,
            [
                DynSolValue::Address(legacy),
                address_array([account]),
                address_array([WETH]),
                uint_array([U256::from(10u64).pow(U256::from(18))]),
                DynSolValue::Address(roles),
            ]
        );

        // Holdings are migrated from no contract at all
        let args =
            margin_holdings_migration_args(&ctx("MarginHoldingsMigration", &deps, &network))
                .unwrap();
        assert_eq!(args[0], DynSolValue::Address(Address::ZERO));
        assert_eq!(args[1], address_array([]));

        assert!(margin_loans_migration_args(&ctx("MarginLoansMigration", &deps, &network)).is_err());
    }

    #[test]
    fn test_incentivize_lending_runs_at_end() {
        let graph = task_graph(&NetworkContext::local("localhost")).unwrap();
        let deferred: Vec<_> = graph
            .names()
            .filter(|name| graph.get(name).is_some_and(|t| t.run_at_end))
            .collect();
        assert_eq!(deferred, ["IncentivizeLending"]);
        assert!(graph.get("IncentivizeLending").unwrap().one_shot);
        assert!(graph.get(TOKEN_ACTIVATION_TASK).unwrap().one_shot);
    }

    #[test]
    fn test_post_deploy_calls_target_dependencies() {
        let graph = task_graph(&NetworkContext::local("localhost")).unwrap();
        for name in graph.names() {
            let task = graph.get(name).unwrap();
            for action in &task.actions {
                assert!(
                    task.dependencies.iter().any(|d| d == action.target()),
                    "{name} calls {} without depending on it",
                    action.target()
                );
            }
        }
        assert_eq!(graph.get(INCENTIVE_DISTRIBUTION_TASK).unwrap().actions.len(), 1);
        assert_eq!(graph.get("LiquidityMiningReward").unwrap().actions.len(), 1);
    }

    #[test]
    fn test_pair_address_matches_uniswap() {
        // The canonical USDC/WETH pair
        assert_eq!(
            pair_address(UNI_FACTORY, UNI_INIT_CODE_HASH, WETH, USDC),
            address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")
        );
        assert_eq!(
            pair_address(UNI_FACTORY, UNI_INIT_CODE_HASH, USDC, WETH),
            pair_address(UNI_FACTORY, UNI_INIT_CODE_HASH, WETH, USDC)
        );
    }

    #[test]
    fn test_token_activation_args() {
        let network = NetworkContext::local("mainnet")
            .with_constant("peg", json!(USDC.to_string()))
            .with_constant("uniswapFactory", json!(UNI_FACTORY.to_string()))
            .with_constant("uniswapInitCodeHash", json!(UNI_INIT_CODE_HASH.to_string()))
            .with_constant(
                "activationTokens",
                json!([{
                    "address": WETH.to_string(),
                    "exposureCap": 10000,
                    "lendingBuffer": 100,
                    "incentiveWeight": 5
                }]),
            );
        let roles = Address::repeat_byte(7);
        let deps = BTreeMap::from([(ROLES_TASK.to_string(), roles)]);
        let ctx = ArgsContext {
            task: "TokenActivation",
            dependencies: &deps,
            network: &network,
            deployer: Address::ZERO,
        };

        let args = token_activation_args(&ctx).unwrap();
        assert_eq!(args.len(), 7);
        assert_eq!(args[0], DynSolValue::Address(roles));
        assert_eq!(
            args[2],
            uint_array([scale_units(10000, TOKEN_PARAM_DECIMALS).unwrap()])
        );
        assert_eq!(
            args[5],
            DynSolValue::Array(vec![address_array([address!(
                "B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"
            )])])
        );
        assert_eq!(
            args[6],
            DynSolValue::Array(vec![address_array([WETH, USDC])])
        );
    }

    #[test]
    fn test_missing_constant_fails_build() {
        let network = NetworkContext::local("kovan");
        let deps = BTreeMap::from([(ROLES_TASK.to_string(), Address::ZERO)]);
        let ctx = ArgsContext {
            task: "Fund",
            dependencies: &deps,
            network: &network,
            deployer: Address::ZERO,
        };
        assert!(matches!(
            weth_and_roles(&ctx),
            Err(ScriptError::Configuration(msg)) if msg.contains("weth")
        ));
    }

    #[test]
    fn test_undeclared_dependency_fails_build() {
        let network = NetworkContext::local("kovan");
        let deps = BTreeMap::new();
        let ctx = ArgsContext {
            task: "Lending",
            dependencies: &deps,
            network: &network,
            deployer: Address::ZERO,
        };
        assert!(matches!(roles_only(&ctx), Err(ScriptError::Configuration(_))));
    }
}
