//! Execution of planned deploy tasks.
//!
//! Each step of a task is independently idempotent: deployments recorded in
//! the address book are reused, single-use contracts that already tore
//! themselves down are not invoked again, and post-deploy calls and wiring
//! query the current on-chain state before sending anything. Failures are never retried; the
//! address book keeps every confirmed deployment so a rerun resumes where the
//! previous run stopped.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    actions::ActionRunner,
    address_book::AddressBook,
    artifacts::{constructor_args_hash, ArtifactResolver},
    client::ChainClient,
    config::NetworkContext,
    errors::ScriptError,
    planner::{plan_against, TaskGraph},
    registrar::{ManageOutcome, OwnershipRegistrar, OwnershipState},
    types::{ArgsContext, CapabilitySet, ConstructorArgs, DeploymentRecord, TaskSpec},
};

/// Executes single deploy tasks against a network
pub struct DeploymentExecutor<'a, C, R> {
    /// The network client
    client: &'a C,
    /// Resolves artifacts to deployable units
    artifacts: &'a R,
    /// The task whose contract acts as the dependency controller
    controller_task: String,
}

impl<'a, C: ChainClient, R: ArtifactResolver> DeploymentExecutor<'a, C, R> {
    /// Create an executor wiring through the given controller task
    pub fn new(client: &'a C, artifacts: &'a R, controller_task: &str) -> Self {
        Self {
            client,
            artifacts,
            controller_task: controller_task.to_string(),
        }
    }

    /// Execute a single task, returning its deployment record
    pub async fn execute(
        &self,
        task: &TaskSpec,
        book: &mut AddressBook,
        network: &NetworkContext,
    ) -> Result<DeploymentRecord, ScriptError> {
        let name = task.name.as_str();
        let network_id = network.network_id.as_str();

        let dependencies = resolve_dependencies(task, book, network_id)?;
        let args = (task.build_args)(&ArgsContext {
            task: name,
            dependencies: &dependencies,
            network,
            deployer: self.client.deployer(),
        })
        .map_err(|e| match e {
            ScriptError::Configuration(_) => e.in_task(name),
            other => ScriptError::config(format!("task `{name}`: building arguments: {other}")),
        })?;

        let record = match book.get(network_id, name) {
            Some(existing) => {
                if existing.constructor_args_hash != constructor_args_hash(&args) {
                    warn!(
                        "`{name}` was deployed with different constructor arguments than configured now, keeping {:#x}",
                        existing.address
                    );
                }
                info!("already deployed: {name} at {:#x}", existing.address);
                existing.clone()
            }
            None => self.deploy(task, args, book, network_id).await?,
        };

        self.run_actions(task, record.address, &dependencies, network)
            .await?;
        if task.one_shot {
            self.run_one_shot(task, record.address, book, network_id)
                .await?;
        }
        self.wire(task, record.address, book, network_id).await?;

        Ok(record)
    }

    /// Deploy a task's contract and record it
    async fn deploy(
        &self,
        task: &TaskSpec,
        args: ConstructorArgs,
        book: &mut AddressBook,
        network_id: &str,
    ) -> Result<DeploymentRecord, ScriptError> {
        let name = task.name.as_str();
        let unit = self
            .artifacts
            .resolve(&task.artifact, args)
            .map_err(|e| e.in_task(name))?;

        info!("deploying {name} ({})", task.artifact);
        let deployment = self
            .client
            .deploy_contract(&unit)
            .await
            .map_err(|e| e.into_tx_failure(name))?;
        info!(
            "deployed {name} at {:#x}, tx: {:#x}",
            deployment.address, deployment.receipt.tx_hash
        );

        let record = DeploymentRecord {
            logical_name: name.to_string(),
            network_id: network_id.to_string(),
            address: deployment.address,
            constructor_args_hash: unit.args_hash(),
            deployed_at_block: deployment.receipt.block_number,
            tx_hash: Some(deployment.receipt.tx_hash),
            artifact: Some(task.artifact.clone()),
        };
        book.put(network_id, record.clone())?;
        Ok(record)
    }

    /// Apply the task's post-deploy actions to their target contracts
    async fn run_actions(
        &self,
        task: &TaskSpec,
        address: Address,
        dependencies: &BTreeMap<String, Address>,
        network: &NetworkContext,
    ) -> Result<(), ScriptError> {
        let runner = ActionRunner::new(self.client, &task.name);
        for action in &task.actions {
            let target = match action.target() {
                own if own == task.name => address,
                other => dependencies.get(other).copied().ok_or_else(|| {
                    ScriptError::config(format!(
                        "task `{}` calls `{other}`, which is not a declared dependency",
                        task.name
                    ))
                })?,
            };
            runner.apply(action, target, network).await?;
        }
        Ok(())
    }

    /// Invoke a single-use contract through the controller unless it has
    /// already self-destructed
    async fn run_one_shot(
        &self,
        task: &TaskSpec,
        address: Address,
        book: &AddressBook,
        network_id: &str,
    ) -> Result<(), ScriptError> {
        let code = self.client.get_code(address).await?;
        if code.is_empty() {
            info!(
                "{} at {address:#x} has self-destructed, skipping execution",
                task.name
            );
            return Ok(());
        }

        let controller = self.controller_address(task, address, book, network_id)?;
        OwnershipRegistrar::new(self.client, &task.name)
            .execute_as_owner(controller, address)
            .await
    }

    /// Register the task's capability grants and ownership hand-overs with the
    /// controller
    async fn wire(
        &self,
        task: &TaskSpec,
        address: Address,
        book: &AddressBook,
        network_id: &str,
    ) -> Result<(), ScriptError> {
        if task.post_deploy.is_empty() && task.hand_over.is_empty() {
            return Ok(());
        }

        let controller = self.controller_address(task, address, book, network_id)?;
        let registrar = OwnershipRegistrar::new(self.client, &task.name);
        let lookup = |name: &str| -> Result<Address, ScriptError> {
            if name == task.name {
                return Ok(address);
            }
            book.address(network_id, name)
                .ok_or_else(|| ScriptError::DependencyNotDeployed {
                    task: task.name.clone(),
                    dependency: name.to_string(),
                })
        };

        let grants = group_by_grantee(task);
        // The managed contract a delegated task ends up owned by
        let delegate_owner = |name: &str| -> Result<Option<Address>, ScriptError> {
            grants
                .iter()
                .find(|g| g.delegate_of.iter().any(|d| *d == name))
                .map(|holder| lookup(holder.grantee))
                .transpose()
        };

        for grant in &grants {
            let grantee = lookup(grant.grantee)?;
            let delegates = grant
                .delegate_of
                .iter()
                .map(|d| lookup(d))
                .collect::<Result<Vec<_>, _>>()?;

            let outcome = registrar
                .manage(
                    controller,
                    grantee,
                    &grant.capabilities,
                    &delegates,
                    delegate_owner(grant.grantee)?,
                )
                .await?;
            match outcome {
                ManageOutcome::NoOp => info!("{} needs no wiring", grant.grantee),
                ManageOutcome::Managed(state) | ManageOutcome::Resumed(state) => {
                    report_ownership(grant.grantee, state)
                }
            }
        }

        for owned in &task.hand_over {
            let state = registrar
                .hand_over(controller, lookup(owned)?, delegate_owner(owned)?)
                .await?;
            report_ownership(owned, state);
        }

        Ok(())
    }

    /// The controller's address: the task's own address when the task is the
    /// controller, otherwise its recorded deployment
    fn controller_address(
        &self,
        task: &TaskSpec,
        own_address: Address,
        book: &AddressBook,
        network_id: &str,
    ) -> Result<Address, ScriptError> {
        if task.name == self.controller_task {
            return Ok(own_address);
        }
        book.address(network_id, &self.controller_task)
            .ok_or_else(|| ScriptError::DependencyNotDeployed {
                task: task.name.clone(),
                dependency: self.controller_task.clone(),
            })
    }
}

/// Plan `target` and execute every planned task in order, stopping at the
/// first failure.
///
/// Returns the records of the executed tasks in plan order.
pub async fn run_plan<C: ChainClient, R: ArtifactResolver>(
    target: &str,
    graph: &TaskGraph,
    book: &mut AddressBook,
    network: &NetworkContext,
    executor: &DeploymentExecutor<'_, C, R>,
) -> Result<Vec<DeploymentRecord>, ScriptError> {
    let planned = plan_against(target, graph, book, &network.network_id)?;
    info!(
        "plan for {target} on {}: {}",
        network.network_id,
        planned
            .iter()
            .map(|p| p.spec.name.as_str())
            .join(", ")
    );

    let mut records = Vec::with_capacity(planned.len());
    for step in planned {
        let record = executor.execute(step.spec, book, network).await?;
        records.push(record);
    }

    Ok(records)
}

/// The capability grants of one grantee, merged across wiring steps
struct Grant<'t> {
    /// The grantee task
    grantee: &'t str,
    /// The capabilities it plays
    capabilities: CapabilitySet,
    /// The tasks it owns as a delegate
    delegate_of: Vec<&'t str>,
}

/// Merge a task's wiring steps per grantee, in order of first appearance.
///
/// Grantees holding delegated contracts are moved after every other grantee,
/// since the controller must own a contract before delegating it.
fn group_by_grantee(task: &TaskSpec) -> Vec<Grant<'_>> {
    let mut grants: Vec<Grant<'_>> = Vec::new();
    for step in &task.post_deploy {
        let idx = match grants.iter().position(|g| g.grantee == step.grantee) {
            Some(idx) => idx,
            None => {
                grants.push(Grant {
                    grantee: &step.grantee,
                    capabilities: CapabilitySet::default(),
                    delegate_of: Vec::new(),
                });
                grants.len() - 1
            }
        };

        let grant = &mut grants[idx];
        grant.capabilities.insert(step.capability);
        if let Some(owned) = step.delegate_of.as_deref() {
            if !grant.delegate_of.contains(&owned) {
                grant.delegate_of.push(owned);
            }
        }
    }
    grants.sort_by_key(|g| !g.delegate_of.is_empty());
    grants
}

/// Resolve the addresses of a task's dependencies
fn resolve_dependencies(
    task: &TaskSpec,
    book: &AddressBook,
    network_id: &str,
) -> Result<BTreeMap<String, Address>, ScriptError> {
    task.dependencies
        .iter()
        .map(|dep| {
            book.address(network_id, dep)
                .map(|addr| (dep.clone(), addr))
                .ok_or_else(|| ScriptError::DependencyNotDeployed {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                })
        })
        .collect()
}

/// Log the ownership state a wiring step left a contract in
fn report_ownership(name: &str, state: OwnershipState) {
    match state {
        OwnershipState::ControllerOwned => info!("{name} is owned by the controller"),
        OwnershipState::DelegateOwned(delegate) => {
            info!("{name} is owned by its delegate {delegate:#x}")
        }
        OwnershipState::DeployerOwned => info!("{name} is still owned by the deployer"),
        OwnershipState::UnknownOwned(owner) => {
            warn!("{name} is owned by {owner:#x} and was left untouched")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, WiringStep};

    fn no_args(_: &ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError> {
        Ok(vec![])
    }

    #[test]
    fn test_wiring_is_grouped_per_grantee() {
        let task = TaskSpec::new("DependencyController", no_args).wiring(vec![
            WiringStep::grant(Capability::Character(104), "CrossMarginTrading"),
            WiringStep::grant(Capability::Role(1), "Lending"),
            WiringStep::grant(Capability::Role(1), "CrossMarginTrading"),
            WiringStep::delegated(Capability::Role(9), "TokenAdmin", "IncentiveDistribution"),
            WiringStep::grant(Capability::Role(1), "CrossMarginTrading"),
            WiringStep::grant(Capability::Character(108), "IncentiveDistribution"),
        ]);

        let grants = group_by_grantee(&task);
        let grantees: Vec<_> = grants.iter().map(|g| g.grantee).collect();
        assert_eq!(
            grantees,
            ["CrossMarginTrading", "Lending", "IncentiveDistribution", "TokenAdmin"]
        );

        assert_eq!(grants[0].capabilities.characters, [104]);
        assert_eq!(grants[0].capabilities.roles, [1]);
        assert_eq!(grants[3].delegate_of, ["IncentiveDistribution"]);
    }
}
