//! Post-deploy calls on deployed contracts.
//!
//! Every call first queries the state it would establish and is skipped when
//! that state already holds, so reruns send nothing.

use alloy_primitives::{Address, U256};
use tracing::{info, warn};

use crate::{
    client::{call_typed, send_typed, ChainClient},
    config::NetworkContext,
    errors::ScriptError,
    solidity::{IFund, IIncentiveDistribution},
    types::PostDeployAction,
};

/// Applies a task's post-deploy actions
pub struct ActionRunner<'a, C> {
    /// The network client
    client: &'a C,
    /// The task the actions belong to, for error reporting
    task: &'a str,
}

impl<'a, C: ChainClient> ActionRunner<'a, C> {
    /// A runner acting on behalf of the given task
    pub fn new(client: &'a C, task: &'a str) -> Self {
        Self { client, task }
    }

    /// Apply `action` to the contract at `target`, returning whether a
    /// transaction was sent
    pub async fn apply(
        &self,
        action: &PostDeployAction,
        target: Address,
        network: &NetworkContext,
    ) -> Result<bool, ScriptError> {
        match action {
            PostDeployAction::ActivateToken { token, .. } => {
                let token = network.address(token).map_err(|e| e.in_task(self.task))?;
                self.activate_token(target, token).await
            }
            PostDeployAction::InitTranche { tranche, share, .. } => {
                self.init_tranche(target, U256::from(*tranche), U256::from(*share))
                    .await
            }
        }
    }

    /// Activate `token` in the fund unless it already is
    async fn activate_token(&self, fund: Address, token: Address) -> Result<bool, ScriptError> {
        let active = call_typed(self.client, fund, IFund::activeTokensCall { token }).await?;
        if active {
            info!("{token:#x} is already active in {fund:#x}");
            return Ok(false);
        }

        let receipt = send_typed(self.client, fund, IFund::activateTokenCall { token })
            .await
            .map_err(|e| e.into_tx_failure(self.task))?;
        info!(
            "activated {token:#x} in {fund:#x}, tx: {:#x}",
            receipt.tx_hash
        );
        Ok(true)
    }

    /// Initialize a tranche with its share unless it already has one
    async fn init_tranche(
        &self,
        distribution: Address,
        tranche: U256,
        share: U256,
    ) -> Result<bool, ScriptError> {
        let current = call_typed(
            self.client,
            distribution,
            IIncentiveDistribution::trancheShareCall { tranche },
        )
        .await?;
        if current == share {
            info!("tranche {tranche} of {distribution:#x} already has share {share}");
            return Ok(false);
        }
        if !current.is_zero() {
            warn!(
                "tranche {tranche} of {distribution:#x} has share {current} instead of {share}, leaving it untouched"
            );
            return Ok(false);
        }

        let call = IIncentiveDistribution::initTrancheCall { tranche, share };
        let receipt = send_typed(self.client, distribution, call)
            .await
            .map_err(|e| e.into_tx_failure(self.task))?;
        info!(
            "initialized tranche {tranche} of {distribution:#x} with share {share}, tx: {:#x}",
            receipt.tx_hash
        );
        Ok(true)
    }
}
