//! Centralized post-deploy authorization wiring through the dependency
//! controller.
//!
//! A managed contract's ownership moves from the deployer to the controller
//! and never back through this path. A contract the controller handed to a
//! delegate is expected to stay with that delegate; a contract owned by
//! anybody else is left alone and reported for manual resolution.

use alloy_primitives::{Address, U256};
use tracing::{info, warn};

use crate::{
    client::{call_typed, send_typed, ChainClient},
    config::NetworkContext,
    errors::ScriptError,
    solidity::{IDependencyController, IOwnable},
    types::CapabilitySet,
};

/// Who administratively owns a managed contract
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    /// Owned by the deployer identity of this run
    DeployerOwned,
    /// Owned by the dependency controller
    ControllerOwned,
    /// Owned by the managed contract the controller delegated it to
    DelegateOwned(Address),
    /// Owned by some other address, requiring manual intervention
    UnknownOwned(Address),
}

/// The result of registering a contract with the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManageOutcome {
    /// The contract was already managed and owned; nothing was sent
    NoOp,
    /// The contract was registered in this call
    Managed(OwnershipState),
    /// The contract was already registered, but its ownership hand-over was
    /// completed in this call
    Resumed(OwnershipState),
}

/// Wires deployed contracts to the dependency controller
pub struct OwnershipRegistrar<'a, C> {
    /// The network client
    client: &'a C,
    /// The task the wiring belongs to, for error reporting
    task: &'a str,
}

impl<'a, C: ChainClient> OwnershipRegistrar<'a, C> {
    /// A registrar acting on behalf of the given task
    pub fn new(client: &'a C, task: &'a str) -> Self {
        Self { client, task }
    }

    /// Register `contract` as playing `capabilities` and owning `delegates`,
    /// then hand its ownership to the controller.
    ///
    /// `delegate_owner` is the managed contract expected to own `contract` once
    /// the controller delegated it, if any. Safe to re-invoke: a contract
    /// already in the controller's managed set is not registered again.
    pub async fn manage(
        &self,
        controller: Address,
        contract: Address,
        capabilities: &CapabilitySet,
        delegates: &[Address],
        delegate_owner: Option<Address>,
    ) -> Result<ManageOutcome, ScriptError> {
        let managed = call_typed(
            self.client,
            controller,
            IDependencyController::allManagedContractsCall {},
        )
        .await?;

        if managed.contains(&contract) {
            let (state, transferred) =
                self.take_ownership(controller, contract, delegate_owner).await?;
            if transferred {
                return Ok(ManageOutcome::Resumed(state));
            }
            info!("{contract:#x} is already managed by {controller:#x}");
            return Ok(ManageOutcome::NoOp);
        }

        // The controller passes delegated contracts on, so it must hold them first
        for delegate in delegates {
            let (state, _) = self
                .take_ownership(controller, *delegate, Some(contract))
                .await?;
            if state != OwnershipState::ControllerOwned {
                return Err(ScriptError::tx_failure(
                    self.task,
                    format!(
                        "controller {controller:#x} does not own {delegate:#x} and cannot delegate it to {contract:#x}"
                    ),
                ));
            }
        }

        let call = IDependencyController::manageContractCall {
            contr: contract,
            charactersPlayed: capabilities.characters.iter().map(|c| U256::from(*c)).collect(),
            rolesPlayed: capabilities.roles.iter().map(|r| U256::from(*r)).collect(),
            ownAsDelegate: delegates.to_vec(),
        };
        let receipt = send_typed(self.client, controller, call)
            .await
            .map_err(|e| e.into_tx_failure(self.task))?;
        info!(
            "managed {contract:#x} (characters {:?}, roles {:?}, delegates {delegates:?}) via {controller:#x}, tx: {:#x}",
            capabilities.characters, capabilities.roles, receipt.tx_hash
        );

        let (state, _) = self
            .take_ownership(controller, contract, delegate_owner)
            .await?;
        Ok(ManageOutcome::Managed(state))
    }

    /// Hand ownership of `contract` to the controller without registering it
    pub async fn hand_over(
        &self,
        controller: Address,
        contract: Address,
        delegate_owner: Option<Address>,
    ) -> Result<OwnershipState, ScriptError> {
        self.take_ownership(controller, contract, delegate_owner)
            .await
            .map(|(state, _)| state)
    }

    /// Have the controller execute a single-use contract as owner
    pub async fn execute_as_owner(
        &self,
        controller: Address,
        executable: Address,
    ) -> Result<(), ScriptError> {
        let call = IDependencyController::executeAsOwnerCall { executable };
        let receipt = send_typed(self.client, controller, call)
            .await
            .map_err(|e| e.into_tx_failure(self.task))?;
        info!(
            "executed {executable:#x} as owner via {controller:#x}, tx: {:#x}",
            receipt.tx_hash
        );
        Ok(())
    }

    /// Return ownership of `contract` from the controller to `new_owner`.
    ///
    /// Only permitted on non-live networks. Returns whether a transaction was sent.
    pub async fn relinquish(
        &self,
        controller: Address,
        contract: Address,
        new_owner: Address,
        network: &NetworkContext,
    ) -> Result<bool, ScriptError> {
        if network.is_live {
            return Err(ScriptError::config(format!(
                "refusing to relinquish ownership of {contract:#x} on live network `{}`",
                network.network_id
            )));
        }

        let owner = self.owner_of(contract).await?;
        if owner == new_owner {
            info!("{contract:#x} is already owned by {new_owner:#x}");
            return Ok(false);
        }
        if owner != controller {
            warn!(
                "AuthorizationMismatch: {contract:#x} is owned by {owner:#x}, not the controller {controller:#x}; cannot relinquish"
            );
            return Ok(false);
        }

        let call = IDependencyController::relinquishOwnershipCall {
            ownableContract: contract,
            newOwner: new_owner,
        };
        let receipt = send_typed(self.client, controller, call)
            .await
            .map_err(|e| e.into_tx_failure(self.task))?;
        info!(
            "relinquished {contract:#x} to {new_owner:#x}, tx: {:#x}",
            receipt.tx_hash
        );
        Ok(true)
    }

    /// The current owner of a contract
    async fn owner_of(&self, contract: Address) -> Result<Address, ScriptError> {
        call_typed(self.client, contract, IOwnable::ownerCall {}).await
    }

    /// Move ownership of `contract` to the controller if the deployer holds it.
    ///
    /// Returns the resulting state and whether a transfer was sent.
    async fn take_ownership(
        &self,
        controller: Address,
        contract: Address,
        delegate_owner: Option<Address>,
    ) -> Result<(OwnershipState, bool), ScriptError> {
        let owner = self.owner_of(contract).await?;
        match classify_owner(owner, self.client.deployer(), controller, delegate_owner) {
            state @ (OwnershipState::ControllerOwned | OwnershipState::DelegateOwned(_)) => {
                Ok((state, false))
            }
            OwnershipState::DeployerOwned => {
                let call = IOwnable::transferOwnershipCall {
                    newOwner: controller,
                };
                let receipt = send_typed(self.client, contract, call)
                    .await
                    .map_err(|e| e.into_tx_failure(self.task))?;
                info!(
                    "transferred ownership of {contract:#x} to {controller:#x}, tx: {:#x}",
                    receipt.tx_hash
                );
                Ok((OwnershipState::ControllerOwned, true))
            }
            unknown => {
                warn!(
                    "AuthorizationMismatch: {contract:#x} is owned by {owner:#x}, neither the deployer nor the controller {controller:#x}; manual intervention required"
                );
                Ok((unknown, false))
            }
        }
    }
}

/// Classify the owner of a contract relative to this run's identities and the
/// delegate the controller is expected to have handed it to
pub fn classify_owner(
    owner: Address,
    deployer: Address,
    controller: Address,
    delegate_owner: Option<Address>,
) -> OwnershipState {
    if owner == controller {
        OwnershipState::ControllerOwned
    } else if delegate_owner == Some(owner) && !owner.is_zero() {
        OwnershipState::DelegateOwned(owner)
    } else if owner == deployer {
        OwnershipState::DeployerOwned
    } else {
        OwnershipState::UnknownOwned(owner)
    }
}
