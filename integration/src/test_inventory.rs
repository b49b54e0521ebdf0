//! Defines types and utilities for managing the inventory of integration tests

use std::{future::Future, pin::Pin};

use eyre::Result;
use margin_deploy::{artifacts::ArtifactDir, client::RpcChainClient, config::NetworkContext};

/// The arguments provided to each integration test
#[derive(Clone)]
pub struct TestArgs {
    /// The RPC client, signing as the deployer
    pub client: RpcChainClient,
    /// The compiled contract artifacts
    pub artifacts: ArtifactDir,
    /// The devnet's network context
    pub network: NetworkContext,
}

/// The signature of an integration test
type TestFn = fn(TestArgs) -> Pin<Box<dyn Future<Output = Result<()>>>>;

/// A struct representing an integration test
pub struct IntegrationTest {
    /// The name of the test
    pub name: &'static str,
    /// The test function
    pub test_fn: TestFn,
}

// Collect the integration tests into an iterable
inventory::collect!(IntegrationTest);

/// Macro to register an integration test
#[macro_export]
macro_rules! integration_test {
    ($test_fn:ident) => {
        inventory::submit!($crate::test_inventory::IntegrationTest {
            name: stringify!($test_fn),
            test_fn: move |args| std::boxed::Box::pin($test_fn(args)),
        });
    };
}
