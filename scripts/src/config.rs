//! The deploy configuration: networks, their liveness, and the named constants
//! the argument builders read.
//!
//! The config file is JSON of the form
//!
//! ```json
//! {
//!     "defaults": { "mfi": "0xAa4e...", "weth": "0xC02a..." },
//!     "networks": {
//!         "mainnet": { "live": true, "constants": { "peg": "0xdAC1..." } },
//!         "localhost": { "live": false, "ephemeral": true }
//!     }
//! }
//! ```
//!
//! A network's constants override the defaults key by key.

use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use alloy_primitives::{utils::parse_units, Address, U256};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::errors::ScriptError;

/// The configuration of a single network
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NetworkConfig {
    /// Whether the network is a production network
    #[serde(default)]
    pub live: bool,
    /// Whether deployments to this network are kept in memory only
    #[serde(default)]
    pub ephemeral: bool,
    /// Named constants specific to this network
    #[serde(default)]
    pub constants: BTreeMap<String, Value>,
}

/// The deploy config file
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeployConfig {
    /// Constants shared by every network unless overridden
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
    /// Per-network configuration
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl DeployConfig {
    /// Load the config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ScriptError::config(format!("reading config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| ScriptError::config(format!("parsing config {}: {e}", path.display())))
    }

    /// Resolve the context of the given network
    pub fn network(&self, network_id: &str) -> Result<NetworkContext, ScriptError> {
        let network = self.networks.get(network_id).ok_or_else(|| {
            ScriptError::config(format!("network `{network_id}` is not configured"))
        })?;

        let mut named_constants = self.defaults.clone();
        named_constants.extend(network.constants.clone());

        Ok(NetworkContext {
            network_id: network_id.to_string(),
            is_live: network.live,
            ephemeral: network.ephemeral,
            named_constants,
        })
    }
}

/// The read-only view of the network a run deploys to
#[derive(Clone, Debug, Default)]
pub struct NetworkContext {
    /// The network identifier, also the address book key
    pub network_id: String,
    /// Whether the network is a production network
    pub is_live: bool,
    /// Whether the address book for this network is kept in memory only
    pub ephemeral: bool,
    /// Named constants, already merged with the defaults
    pub named_constants: BTreeMap<String, Value>,
}

impl NetworkContext {
    /// A non-live, persisted network with no constants
    pub fn local(network_id: &str) -> Self {
        Self {
            network_id: network_id.to_string(),
            ..Default::default()
        }
    }

    /// Set a named constant
    pub fn with_constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named_constants.insert(name.to_string(), value.into());
        self
    }

    /// Look up a raw named constant
    pub fn constant(&self, name: &str) -> Result<&Value, ScriptError> {
        self.named_constants.get(name).ok_or_else(|| {
            ScriptError::config(format!(
                "named constant `{name}` is not set for network `{}`",
                self.network_id
            ))
        })
    }

    /// Look up a named constant and deserialize it
    pub fn constant_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ScriptError> {
        let value = self.constant(name)?.clone();
        serde_json::from_value(value)
            .map_err(|e| ScriptError::config(format!("named constant `{name}`: {e}")))
    }

    /// Look up a named constant holding an address
    pub fn address(&self, name: &str) -> Result<Address, ScriptError> {
        let raw = self.constant(name)?.as_str().ok_or_else(|| {
            ScriptError::config(format!("named constant `{name}` is not an address string"))
        })?;
        Address::from_str(raw)
            .map_err(|e| ScriptError::config(format!("named constant `{name}`: {e}")))
    }

    /// Look up a named constant holding an unsigned integer, either as a JSON
    /// number or as a decimal string
    pub fn uint(&self, name: &str) -> Result<U256, ScriptError> {
        match self.constant(name)? {
            Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(|| {
                ScriptError::config(format!("named constant `{name}` is not an unsigned integer"))
            }),
            Value::String(s) => U256::from_str(s)
                .map_err(|e| ScriptError::config(format!("named constant `{name}`: {e}"))),
            _ => Err(ScriptError::config(format!(
                "named constant `{name}` is not an unsigned integer"
            ))),
        }
    }
}

/// Scale a human-readable amount to a fixed-point integer with the given decimals
pub fn scale_units(amount: u64, decimals: u8) -> Result<U256, ScriptError> {
    parse_units(&amount.to_string(), decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| ScriptError::config(format!("scaling {amount}: {e}")))
}
