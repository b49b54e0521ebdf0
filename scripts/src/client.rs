//! The narrow network contract the orchestrator consumes, and its RPC
//! implementation

use std::str::FromStr;

use alloy::{
    network::{Ethereum, TransactionBuilder},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use tracing::info;

use crate::{artifacts::DeployableUnit, errors::ScriptError};

/// The confirmation of a mined transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// The transaction hash
    pub tx_hash: B256,
    /// The block the transaction was included in
    pub block_number: Option<u64>,
}

/// A confirmed contract deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deployment {
    /// The address of the new contract
    pub address: Address,
    /// The receipt of the deployment transaction
    pub receipt: TxReceipt,
}

/// Access to the network a deploy runs against.
///
/// Every method awaits confirmation before returning. Implementations never
/// retry: a failed transaction is surfaced as an error and aborts the run.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// The address transactions are sent from
    fn deployer(&self) -> Address;

    /// Deploy a contract and wait for the receipt
    async fn deploy_contract(&self, unit: &DeployableUnit) -> Result<Deployment, ScriptError>;

    /// Execute a read-only call
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ScriptError>;

    /// Send a transaction and wait for the receipt
    async fn send_transaction(&self, to: Address, calldata: Bytes)
        -> Result<TxReceipt, ScriptError>;

    /// The runtime code at an address, empty if there is none
    async fn get_code(&self, address: Address) -> Result<Bytes, ScriptError>;
}

/// Execute a typed read-only call and decode its return value
pub async fn call_typed<C: ChainClient, T: SolCall>(
    client: &C,
    to: Address,
    call: T,
) -> Result<T::Return, ScriptError> {
    let ret = client.call(to, call.abi_encode().into()).await?;
    T::abi_decode_returns(&ret).map_err(|e| {
        ScriptError::ContractInteraction(format!("decoding {} at {to:#x}: {e}", T::SIGNATURE))
    })
}

/// Send a typed transaction
pub async fn send_typed<C: ChainClient, T: SolCall>(
    client: &C,
    to: Address,
    call: T,
) -> Result<TxReceipt, ScriptError> {
    client.send_transaction(to, call.abi_encode().into()).await
}

/// A [`ChainClient`] backed by an alloy HTTP provider with a local signer
#[derive(Clone)]
pub struct RpcChainClient {
    /// The provider, with the deployer's wallet attached
    provider: DynProvider<Ethereum>,
    /// The deployer's address
    deployer: Address,
}

/// Sets up the client used for deployment, reading in the private key and RPC url
pub async fn setup_client(priv_key: &str, rpc_url: &str) -> Result<RpcChainClient, ScriptError> {
    let signer = PrivateKeySigner::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let url = Url::parse(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

    let deployer = signer.address();
    let provider = ProviderBuilder::new().wallet(signer).connect_http(url);
    let provider = DynProvider::new(provider);

    let chain_id = provider
        .get_chain_id()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    info!("connected to chain {chain_id} as {deployer:#x}");

    Ok(RpcChainClient { provider, deployer })
}

impl RpcChainClient {
    /// The underlying provider
    pub fn provider(&self) -> &DynProvider<Ethereum> {
        &self.provider
    }

    /// Send a transaction request and wait for a successful receipt
    async fn send_and_confirm(
        &self,
        tx: TransactionRequest,
    ) -> Result<TransactionReceipt, ScriptError> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        info!("submitted tx {tx_hash:#x}, awaiting receipt");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("tx {tx_hash:#x}: {e}")))?;
        if !receipt.status() {
            return Err(ScriptError::ContractInteraction(format!(
                "tx {tx_hash:#x} reverted"
            )));
        }

        Ok(receipt)
    }
}

impl ChainClient for RpcChainClient {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn deploy_contract(&self, unit: &DeployableUnit) -> Result<Deployment, ScriptError> {
        let tx = TransactionRequest::default().with_deploy_code(unit.deploy_code());
        let receipt = self.send_and_confirm(tx).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            ScriptError::ContractInteraction(format!(
                "receipt of {:#x} carries no contract address",
                receipt.transaction_hash
            ))
        })?;

        Ok(Deployment {
            address,
            receipt: TxReceipt {
                tx_hash: receipt.transaction_hash,
                block_number: receipt.block_number,
            },
        })
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ScriptError> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata);
        self.provider
            .call(tx)
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("call to {to:#x}: {e}")))
    }

    async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<TxReceipt, ScriptError> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata);
        let receipt = self.send_and_confirm(tx).await?;
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ScriptError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("code at {address:#x}: {e}")))
    }
}
