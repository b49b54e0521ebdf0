//! Resolution of compiled contract artifacts into deployable units.
//!
//! Artifacts are the JSON files emitted by the Solidity toolchain, holding at
//! least an `abi` array and a hex `bytecode` string. They are looked up by
//! contract name either directly under the artifacts directory
//! (`<dir>/<Name>.json`) or in the nested `contracts/**/<Name>.sol/<Name>.json`
//! layout.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use alloy::{dyn_abi::DynSolValue, json_abi::JsonAbi};
use alloy_primitives::{keccak256, Bytes, B256};
use serde::Deserialize;

use crate::{constants::ARTIFACT_EXTENSION, errors::ScriptError, types::ConstructorArgs};

/// The subset of a compilation artifact the orchestrator reads
#[derive(Deserialize)]
struct RawArtifact {
    /// The contract ABI
    abi: JsonAbi,
    /// The creation bytecode, hex encoded
    bytecode: Bytes,
}

/// A contract ready to be deployed
#[derive(Clone, Debug)]
pub struct DeployableUnit {
    /// The name of the compiled contract
    pub artifact: String,
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode
    pub bytecode: Bytes,
    /// The constructor arguments
    pub constructor_args: ConstructorArgs,
}

impl DeployableUnit {
    /// The ABI encoding of the constructor arguments
    pub fn encoded_args(&self) -> Vec<u8> {
        encode_constructor_args(&self.constructor_args)
    }

    /// The hash identifying the constructor arguments in the address book
    pub fn args_hash(&self) -> B256 {
        constructor_args_hash(&self.constructor_args)
    }

    /// The creation code followed by the encoded constructor arguments
    pub fn deploy_code(&self) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend(self.encoded_args());
        code.into()
    }
}

/// ABI-encode constructor arguments as a parameter list
pub fn encode_constructor_args(args: &ConstructorArgs) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.clone()).abi_encode_params()
}

/// Hash constructor arguments for the address book
pub fn constructor_args_hash(args: &ConstructorArgs) -> B256 {
    keccak256(encode_constructor_args(args))
}

/// Resolves contract names to deployable units
pub trait ArtifactResolver {
    /// Resolve the artifact of the given name, attaching the constructor arguments
    fn resolve(
        &self,
        artifact: &str,
        constructor_args: ConstructorArgs,
    ) -> Result<DeployableUnit, ScriptError>;
}

/// Reads artifacts from a directory of compiler output
#[derive(Clone, Debug)]
pub struct ArtifactDir {
    /// The root of the artifacts directory
    root: PathBuf,
}

impl ArtifactDir {
    /// Resolve artifacts from the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the artifact file of the given contract
    fn find(&self, artifact: &str) -> Result<PathBuf, ScriptError> {
        let file_name = format!("{artifact}.{ARTIFACT_EXTENSION}");
        let flat = self.root.join(&file_name);
        if flat.is_file() {
            return Ok(flat);
        }

        let sol_dir = format!("{artifact}.sol");
        find_nested(&self.root, &sol_dir, &file_name)?.ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "no artifact for `{artifact}` under {}",
                self.root.display()
            ))
        })
    }
}

impl ArtifactResolver for ArtifactDir {
    fn resolve(
        &self,
        artifact: &str,
        constructor_args: ConstructorArgs,
    ) -> Result<DeployableUnit, ScriptError> {
        let path = self.find(artifact)?;
        let contents = fs::read_to_string(&path)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {e}", path.display())))?;
        let raw: RawArtifact = serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {e}", path.display())))?;

        if raw.bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "`{artifact}` has no creation bytecode, is it abstract?"
            )));
        }

        check_constructor_arity(artifact, &raw.abi, &constructor_args)?;
        Ok(DeployableUnit {
            artifact: artifact.to_string(),
            abi: raw.abi,
            bytecode: raw.bytecode,
            constructor_args,
        })
    }
}

/// Depth-first search for `<sol_dir>/<file_name>` below `dir`
fn find_nested(
    dir: &Path,
    sol_dir: &str,
    file_name: &str,
) -> Result<Option<PathBuf>, ScriptError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ScriptError::ArtifactParsing(format!(
                "reading {}: {e}",
                dir.display()
            )))
        }
    };

    for entry in entries {
        let path = entry
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?
            .path();
        if !path.is_dir() {
            continue;
        }

        if path.file_name().is_some_and(|n| n == sol_dir) {
            let candidate = path.join(file_name);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        if let Some(found) = find_nested(&path, sol_dir, file_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Reject argument lists that cannot match the artifact's constructor
fn check_constructor_arity(
    artifact: &str,
    abi: &JsonAbi,
    args: &ConstructorArgs,
) -> Result<(), ScriptError> {
    let expected = abi.constructor().map_or(0, |c| c.inputs.len());
    if expected != args.len() {
        return Err(ScriptError::config(format!(
            "`{artifact}` takes {expected} constructor arguments, the builder produced {}",
            args.len()
        )));
    }
    Ok(())
}
