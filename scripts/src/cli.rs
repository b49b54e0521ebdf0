//! Definitions of CLI arguments and commands for the deploy orchestrator

use std::path::PathBuf;

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{deploy, export_addresses, list_deployments, print_plan, relinquish},
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIG_PATH, DEFAULT_DEPLOYMENTS_PATH, DEFAULT_EXPORT_PATH,
    },
    errors::ScriptError,
};

/// Deploys and wires the protocol's contracts, resuming where previous runs stopped
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PKEY", hide_env_values = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// The network to deploy to, as named in the config file
    #[arg(short, long, default_value = "localhost")]
    pub network: String,

    /// Path to the file in which deployed addresses are recorded
    #[arg(long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments_path: PathBuf,

    /// Path to the deploy config holding networks and named constants
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory holding the compiled contract artifacts
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_dir: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The orchestrator's commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy a task and everything it depends on
    Deploy(TaskArgs),
    /// Print every deployment recorded for the network
    ListDeployments,
    /// Write the deployed addresses of every network to a flat JSON file
    ExportAddresses(ExportArgs),
    /// Print the order in which a task and its dependencies would run
    Plan(TaskArgs),
    /// Return ownership of a managed contract from the controller
    Relinquish(RelinquishArgs),
}

impl Command {
    /// Run the command with the global options
    pub async fn run(self, globals: &GlobalArgs) -> Result<(), ScriptError> {
        match self {
            Command::Deploy(args) => deploy(args, globals).await,
            Command::ListDeployments => list_deployments(globals),
            Command::ExportAddresses(args) => export_addresses(args, globals),
            Command::Plan(args) => print_plan(args, globals),
            Command::Relinquish(args) => relinquish(args, globals).await,
        }
    }
}

/// The global options every command may read
pub struct GlobalArgs {
    /// Private key of the deployer
    pub priv_key: Option<String>,
    /// Network RPC URL
    pub rpc_url: Option<String>,
    /// The network to act on
    pub network: String,
    /// Path to the deployments file
    pub deployments_path: PathBuf,
    /// Path to the deploy config
    pub config: PathBuf,
    /// Directory holding the compiled artifacts
    pub artifacts_dir: PathBuf,
}

impl Cli {
    /// Split the parsed CLI into its global options and command
    pub fn into_parts(self) -> (GlobalArgs, Command) {
        let Cli {
            priv_key,
            rpc_url,
            network,
            deployments_path,
            config,
            artifacts_dir,
            command,
        } = self;

        let globals = GlobalArgs {
            priv_key,
            rpc_url,
            network,
            deployments_path,
            config,
            artifacts_dir,
        };
        (globals, command)
    }
}

/// Arguments naming a single task
#[derive(Args)]
pub struct TaskArgs {
    /// The logical name of the task, e.g. `DependencyController`
    pub task: String,
}

/// Export the deployed addresses
#[derive(Args)]
pub struct ExportArgs {
    /// Path to write the addresses to
    #[arg(short, long, default_value = DEFAULT_EXPORT_PATH)]
    pub output: PathBuf,
}

/// Relinquish controller ownership of a deployed contract
#[derive(Args)]
pub struct RelinquishArgs {
    /// The task whose contract is released
    pub task: String,

    /// The address receiving ownership
    #[arg(long)]
    pub new_owner: Address,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_relinquish() {
        let cli = Cli::try_parse_from([
            "deploy",
            "--network",
            "kovan",
            "relinquish",
            "Lending",
            "--new-owner",
            "0x0000000000000000000000000000000000000001",
        ])
        .unwrap();

        let (globals, command) = cli.into_parts();
        assert_eq!(globals.network, "kovan");
        assert_eq!(globals.deployments_path, PathBuf::from(DEFAULT_DEPLOYMENTS_PATH));
        match command {
            Command::Relinquish(args) => {
                assert_eq!(args.task, "Lending");
                assert_eq!(args.new_owner, Address::with_last_byte(1));
            }
            _ => panic!("expected relinquish"),
        }
    }
}
