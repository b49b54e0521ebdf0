//! Definitions of errors that can occur during the execution of the deploy orchestrator

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the deploy orchestrator
#[derive(Debug)]
pub enum ScriptError {
    /// A fatal configuration error: a missing named constant, an unknown
    /// or cyclic task dependency, or a malformed constructor-argument builder
    Configuration(String),
    /// A required upstream task has no record in the address book
    DependencyNotDeployed {
        /// The task being executed
        task: String,
        /// The dependency missing from the address book
        dependency: String,
    },
    /// A deployment or wiring transaction was rejected, reverted, or timed out.
    /// The partial address book is preserved, so rerunning resumes the deploy
    TransactionFailure {
        /// The task whose transaction failed
        task: String,
        /// The underlying failure
        reason: String,
    },
    /// Error reading the deployments file
    ReadDeployments(String),
    /// Error writing the deployments file
    WriteDeployments(String),
    /// Error parsing a Solidity compilation artifact
    ArtifactParsing(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error calling a contract method or decoding its result
    ContractInteraction(String),
}

impl ScriptError {
    /// Construct a configuration error from anything printable
    pub fn config(msg: impl Display) -> Self {
        ScriptError::Configuration(msg.to_string())
    }

    /// Construct a transaction failure for the given task
    pub fn tx_failure(task: &str, reason: impl Display) -> Self {
        ScriptError::TransactionFailure {
            task: task.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The class name printed to the operator when a run aborts
    pub fn class(&self) -> &'static str {
        match self {
            ScriptError::Configuration(_) => "ConfigurationError",
            ScriptError::DependencyNotDeployed { .. } => "DependencyNotDeployed",
            ScriptError::TransactionFailure { .. } => "TransactionFailure",
            ScriptError::ReadDeployments(_) => "ReadDeployments",
            ScriptError::WriteDeployments(_) => "WriteDeployments",
            ScriptError::ArtifactParsing(_) => "ArtifactParsing",
            ScriptError::ClientInitialization(_) => "ClientInitialization",
            ScriptError::ContractInteraction(_) => "ContractInteraction",
        }
    }

    /// Reclassify a failed network interaction as a transaction failure of the task
    pub(crate) fn into_tx_failure(self, task: &str) -> Self {
        match self {
            ScriptError::ContractInteraction(reason) => ScriptError::TransactionFailure {
                task: task.to_string(),
                reason,
            },
            e => e,
        }
    }

    /// Attach the task being executed to errors that do not already carry one
    pub(crate) fn in_task(self, task: &str) -> Self {
        match self {
            ScriptError::Configuration(s) => {
                ScriptError::Configuration(format!("task `{task}`: {s}"))
            }
            ScriptError::ContractInteraction(s) => {
                ScriptError::ContractInteraction(format!("task `{task}`: {s}"))
            }
            ScriptError::ArtifactParsing(s) => {
                ScriptError::ArtifactParsing(format!("task `{task}`: {s}"))
            }
            e => e,
        }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Configuration(s) => write!(f, "configuration error: {}", s),
            ScriptError::DependencyNotDeployed { task, dependency } => write!(
                f,
                "dependency `{}` of task `{}` is not deployed",
                dependency, task
            ),
            ScriptError::TransactionFailure { task, reason } => {
                write!(f, "transaction failed in task `{}`: {}", task, reason)
            }
            ScriptError::ReadDeployments(s) => write!(f, "error reading deployments: {}", s),
            ScriptError::WriteDeployments(s) => write!(f, "error writing deployments: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::ContractInteraction(s) => {
                write!(f, "error interacting with contract: {}", s)
            }
        }
    }
}

impl Error for ScriptError {}
