//! Integration tests for the deploy orchestrator

use eyre::Result;
use margin_deploy::{
    address_book::AddressBook,
    artifacts::ArtifactDir,
    catalog::task_graph,
    client::RpcChainClient,
    constants::DEPENDENCY_CONTROLLER_TASK,
    executor::{run_plan, DeploymentExecutor},
};

use crate::test_inventory::TestArgs;


/// Deploy `target` into the given address book
pub(crate) async fn deploy_into(
    target: &str,
    book: &mut AddressBook,
    args: &TestArgs,
) -> Result<()> {
    let graph = task_graph(&args.network)?;
    let executor: DeploymentExecutor<'_, RpcChainClient, ArtifactDir> =
        DeploymentExecutor::new(&args.client, &args.artifacts, DEPENDENCY_CONTROLLER_TASK);
    run_plan(target, &graph, book, &args.network, &executor).await?;
    Ok(())
}
