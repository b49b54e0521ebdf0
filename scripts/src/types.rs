//! Type definitions used throughout the scripts

use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::{config::NetworkContext, errors::ScriptError};

/// The ABI-encodable constructor arguments of a contract
pub type ConstructorArgs = Vec<DynSolValue>;

/// A builder deriving a task's constructor arguments from its context
pub type ArgsBuilder = fn(&ArgsContext<'_>) -> Result<ConstructorArgs, ScriptError>;

/// A record of a single deployed contract, created on first successful deploy
/// and never mutated afterwards
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// The logical name of the contract
    pub logical_name: String,
    /// The network the contract was deployed to
    pub network_id: String,
    /// The deployed address
    pub address: Address,
    /// The keccak hash of the ABI-encoded constructor arguments
    pub constructor_args_hash: B256,
    /// The block in which the deployment was confirmed, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at_block: Option<u64>,
    /// The hash of the deployment transaction, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    /// The compiled artifact the contract was deployed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

/// A role played by a deployed contract in the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// A character the contract plays, e.g. "fund" or "router"
    Character(u16),
    /// A permission granted to the contract, e.g. "withdrawer"
    Role(u16),
}

impl Capability {
    /// The on-chain id of the capability
    pub fn id(&self) -> u16 {
        match self {
            Capability::Character(id) | Capability::Role(id) => *id,
        }
    }
}

/// A post-deploy capability grant: "grantee plays capability X"
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WiringStep {
    /// The capability granted
    pub capability: Capability,
    /// The task whose contract receives the capability
    pub grantee: String,
    /// A task whose contract the grantee owns as a delegate of the controller
    pub delegate_of: Option<String>,
}

impl WiringStep {
    /// A plain capability grant
    pub fn grant(capability: Capability, grantee: &str) -> Self {
        Self {
            capability,
            grantee: grantee.to_string(),
            delegate_of: None,
        }
    }

    /// A capability grant that also makes the grantee the delegate owner of `owned`
    pub fn delegated(capability: Capability, grantee: &str, owned: &str) -> Self {
        Self {
            capability,
            grantee: grantee.to_string(),
            delegate_of: Some(owned.to_string()),
        }
    }
}

/// A call made on a deployed contract once a task is deployed, sent only when
/// a query shows it has not taken effect yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostDeployAction {
    /// Activate a token in the fund
    ActivateToken {
        /// The task whose contract is the fund
        fund: String,
        /// The named constant holding the token's address
        token: String,
    },
    /// Give a tranche of the incentive distribution its share
    InitTranche {
        /// The task whose contract distributes incentives
        distribution: String,
        /// The tranche id
        tranche: u64,
        /// The tranche's share of the distribution, per mille
        share: u64,
    },
}

impl PostDeployAction {
    /// The task whose contract the action calls
    pub fn target(&self) -> &str {
        match self {
            PostDeployAction::ActivateToken { fund, .. } => fund,
            PostDeployAction::InitTranche { distribution, .. } => distribution,
        }
    }
}

/// The capabilities a single managed contract plays, split by kind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Characters played
    pub characters: Vec<u16>,
    /// Permissions granted
    pub roles: Vec<u16>,
}

impl CapabilitySet {
    /// Add a capability, ignoring duplicates
    pub fn insert(&mut self, capability: Capability) {
        let ids = match capability {
            Capability::Character(_) => &mut self.characters,
            Capability::Role(_) => &mut self.roles,
        };
        if !ids.contains(&capability.id()) {
            ids.push(capability.id());
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::default();
        iter.into_iter().for_each(|c| set.insert(c));
        set
    }
}

/// The static definition of a deployable task
#[derive(Clone, Debug)]
pub struct TaskSpec {
    /// The logical name of the task, also its address book key
    pub name: String,
    /// The compiled artifact to deploy
    pub artifact: String,
    /// The tasks that must be deployed before this one
    pub dependencies: Vec<String>,
    /// Derives the constructor arguments
    pub build_args: ArgsBuilder,
    /// Capability grants registered with the controller after deployment
    pub post_deploy: Vec<WiringStep>,
    /// Tasks whose ownership is handed to the controller without registration
    pub hand_over: Vec<String>,
    /// Calls made on the task's dependencies once it is deployed
    pub actions: Vec<PostDeployAction>,
    /// Whether the contract is a single-use migration executed once by the controller
    pub one_shot: bool,
    /// Whether the task is deferred until every other task has run
    pub run_at_end: bool,
}

impl TaskSpec {
    /// A task with no dependencies deploying the artifact of the same name
    pub fn new(name: &str, build_args: ArgsBuilder) -> Self {
        Self {
            name: name.to_string(),
            artifact: name.to_string(),
            dependencies: Vec::new(),
            build_args,
            post_deploy: Vec::new(),
            hand_over: Vec::new(),
            actions: Vec::new(),
            one_shot: false,
            run_at_end: false,
        }
    }

    /// Set the task's dependencies
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Deploy a differently named artifact
    pub fn with_artifact(mut self, artifact: &str) -> Self {
        self.artifact = artifact.to_string();
        self
    }

    /// Set the task's capability grants
    pub fn wiring(mut self, steps: Vec<WiringStep>) -> Self {
        self.post_deploy = steps;
        self
    }

    /// Set the tasks whose ownership this task takes over
    pub fn hands_over(mut self, tasks: &[&str]) -> Self {
        self.hand_over = tasks.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Add a call made once the task is deployed
    pub fn then_call(mut self, action: PostDeployAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Mark the task as a single-use migration
    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }

    /// Defer the task to the end of the run
    pub fn at_end(mut self) -> Self {
        self.run_at_end = true;
        self
    }
}

/// Everything an [`ArgsBuilder`] may read
pub struct ArgsContext<'a> {
    /// The task being built
    pub task: &'a str,
    /// The deployed addresses of the task's dependencies
    pub dependencies: &'a BTreeMap<String, Address>,
    /// The network being deployed to
    pub network: &'a NetworkContext,
    /// The address of the deployer
    pub deployer: Address,
}

impl ArgsContext<'_> {
    /// The deployed address of a dependency
    pub fn dependency(&self, name: &str) -> Result<Address, ScriptError> {
        self.dependencies.get(name).copied().ok_or_else(|| {
            ScriptError::config(format!(
                "argument builder of `{}` reads `{name}`, which is not a declared dependency",
                self.task
            ))
        })
    }
}
