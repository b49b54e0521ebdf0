use clap::Parser;
use margin_deploy::{cli::Cli, errors::ScriptError};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (globals, command) = Cli::parse().into_parts();
    command.run(&globals).await.inspect_err(|e| {
        error!("{}: {e}", e.class());
    })
}
