//! Implementations of the orchestrator's commands

use alloy_primitives::Address;
use tracing::info;

use crate::{
    address_book::{AddressBook, DeploymentLock},
    artifacts::ArtifactDir,
    catalog::task_graph,
    cli::{ExportArgs, GlobalArgs, RelinquishArgs, TaskArgs},
    client::{setup_client, RpcChainClient},
    config::{DeployConfig, NetworkContext},
    constants::DEPENDENCY_CONTROLLER_TASK,
    errors::ScriptError,
    executor::{run_plan, DeploymentExecutor},
    planner::plan_against,
    registrar::OwnershipRegistrar,
};

/// Deploy a task and its dependencies, resuming from the recorded deployments
pub async fn deploy(args: TaskArgs, globals: &GlobalArgs) -> Result<(), ScriptError> {
    let network = load_network(globals)?;
    let graph = task_graph(&network)?;

    // Held until the run ends, successful or not
    let _lock = DeploymentLock::acquire(&globals.deployments_path)?;
    let mut book = open_book(globals, &network)?;

    let client = connect(globals).await?;
    let artifacts = ArtifactDir::new(globals.artifacts_dir.clone());
    let executor = DeploymentExecutor::new(&client, &artifacts, DEPENDENCY_CONTROLLER_TASK);

    let records = run_plan(&args.task, &graph, &mut book, &network, &executor).await?;
    if let Some(target) = records.last() {
        info!(
            "{} is deployed at {:#x} on {} ({} tasks run)",
            target.logical_name,
            target.address,
            network.network_id,
            records.len()
        );
    }

    Ok(())
}

/// Print every deployment recorded for the network
pub fn list_deployments(globals: &GlobalArgs) -> Result<(), ScriptError> {
    let book = AddressBook::load(globals.deployments_path.clone())?;
    let Some(records) = book.all(&globals.network) else {
        println!("no deployments recorded for {}", globals.network);
        return Ok(());
    };

    for record in records.values() {
        let block = record
            .deployed_at_block
            .map(|b| format!(" (block {b})"))
            .unwrap_or_default();
        println!("{:<24} {:#x}{block}", record.logical_name, record.address);
    }
    Ok(())
}

/// Write the flat address view of every network
pub fn export_addresses(args: ExportArgs, globals: &GlobalArgs) -> Result<(), ScriptError> {
    let book = AddressBook::load(globals.deployments_path.clone())?;
    book.export(&args.output)?;
    info!("exported deployed addresses to {}", args.output.display());
    Ok(())
}

/// Print the execution order of a task without touching the network
pub fn print_plan(args: TaskArgs, globals: &GlobalArgs) -> Result<(), ScriptError> {
    let network = load_network(globals)?;
    let graph = task_graph(&network)?;
    let book = AddressBook::load(globals.deployments_path.clone())?;

    for (i, step) in plan_against(&args.task, &graph, &book, &network.network_id)?
        .iter()
        .enumerate()
    {
        let marker = if step.already_deployed { "deployed" } else { "pending" };
        let deferred = if step.spec.run_at_end { ", at end" } else { "" };
        println!("{:>2}. {:<24} [{marker}{deferred}]", i + 1, step.spec.name);
    }
    Ok(())
}

/// Hand ownership of a managed contract from the controller to a new owner.
///
/// Refused on live networks by the registrar.
pub async fn relinquish(args: RelinquishArgs, globals: &GlobalArgs) -> Result<(), ScriptError> {
    let network = load_network(globals)?;
    let book = open_book(globals, &network)?;
    let lookup = |name: &str| -> Result<Address, ScriptError> {
        book.address(&network.network_id, name)
            .ok_or_else(|| ScriptError::DependencyNotDeployed {
                task: args.task.clone(),
                dependency: name.to_string(),
            })
    };
    let controller = lookup(DEPENDENCY_CONTROLLER_TASK)?;
    let contract = lookup(&args.task)?;

    let client = connect(globals).await?;
    OwnershipRegistrar::new(&client, &args.task)
        .relinquish(controller, contract, args.new_owner, &network)
        .await?;
    Ok(())
}

/// Resolve the network the command acts on
fn load_network(globals: &GlobalArgs) -> Result<NetworkContext, ScriptError> {
    DeployConfig::load(&globals.config)?.network(&globals.network)
}

/// Open the address book, detached from its file on ephemeral networks
fn open_book(globals: &GlobalArgs, network: &NetworkContext) -> Result<AddressBook, ScriptError> {
    let book = AddressBook::load(globals.deployments_path.clone())?;
    if network.ephemeral {
        info!(
            "{} is ephemeral, deployments are kept in memory only",
            network.network_id
        );
        return Ok(book.detach());
    }
    Ok(book)
}

/// Connect to the network with the deployer's key
async fn connect(globals: &GlobalArgs) -> Result<RpcChainClient, ScriptError> {
    let priv_key = globals
        .priv_key
        .as_deref()
        .ok_or_else(|| ScriptError::config("no private key given, set --priv-key or PKEY"))?;
    let rpc_url = globals
        .rpc_url
        .as_deref()
        .ok_or_else(|| ScriptError::config("no RPC url given, set --rpc-url or RPC_URL"))?;
    setup_client(priv_key, rpc_url).await
}
