//! Devnet integration tests for the deploy orchestrator. These assume that a
//! devnet (e.g. anvil) is already running locally and that the contracts have
//! been compiled.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{bail, Result};
use margin_deploy::{artifacts::ArtifactDir, client::setup_client, config::DeployConfig};
use test_inventory::{IntegrationTest, TestArgs};
use tracing_subscriber::EnvFilter;

mod abis;
mod test_inventory;
mod tests;

/// The default private key for the tests, the first default account in an Anvil node
const DEFAULT_PKEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// The CLI arguments for the integration tests
#[derive(Debug, Clone, Parser)]
struct CliArgs {
    /// The private key to use for testing
    #[clap(short = 'p', long, env = "PKEY", default_value = DEFAULT_PKEY)]
    pkey: String,
    /// The RPC url to run the tests against
    #[clap(short = 'r', long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,
    /// The deploy config holding the devnet's named constants
    #[clap(long, default_value = "../deploy.config.json")]
    config: PathBuf,
    /// The network to read from the config
    #[clap(short, long, default_value = "localhost")]
    network: String,
    /// Directory holding the compiled contract artifacts
    #[clap(long, default_value = "../artifacts")]
    artifacts_dir: PathBuf,

    // --- Test Harness Args --- //
    /// Only run the tests whose name contains this string
    #[arg(short, long)]
    test: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let CliArgs {
        pkey,
        rpc_url,
        config,
        network,
        artifacts_dir,
        test,
    } = CliArgs::parse();

    let network = DeployConfig::load(&config)?.network(&network)?;
    if network.is_live {
        bail!(
            "refusing to run integration tests against live network `{}`",
            network.network_id
        );
    }

    let client = setup_client(&pkey, &rpc_url).await?;
    let args = TestArgs {
        client,
        artifacts: ArtifactDir::new(artifacts_dir),
        network,
    };

    let mut failed = Vec::new();
    for IntegrationTest { name, test_fn } in inventory::iter::<IntegrationTest> {
        if test.as_deref().is_some_and(|filter| !name.contains(filter)) {
            continue;
        }

        match test_fn(args.clone()).await {
            Ok(()) => println!("{} {name}", "PASS".green().bold()),
            Err(e) => {
                println!("{} {name}: {e:?}", "FAIL".red().bold());
                failed.push(*name);
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} test(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
