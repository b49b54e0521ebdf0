//! The address book: a persisted mapping from network to logical contract name
//! to deployment record.
//!
//! Every `put` writes the whole book through to disk by writing a sibling
//! temporary file and renaming it over the deployments file, so a crash
//! mid-write leaves the previously recorded deployments intact.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use alloy_primitives::Address;
use tracing::{debug, warn};

use crate::{
    constants::{LOCK_FILE_SUFFIX, TMP_FILE_SUFFIX},
    errors::ScriptError,
    types::DeploymentRecord,
};

/// The records of a single network, keyed by logical name
pub type NetworkRecords = BTreeMap<String, DeploymentRecord>;

/// Deployment records of every network
#[derive(Debug, Default)]
pub struct AddressBook {
    /// The file the book is persisted to, `None` for an in-memory book
    path: Option<PathBuf>,
    /// The records, keyed by network id
    records: BTreeMap<String, NetworkRecords>,
}

impl AddressBook {
    /// An address book that is never persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the address book from the given file, starting empty if the file
    /// does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ScriptError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ScriptError::ReadDeployments(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no deployments file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(ScriptError::ReadDeployments(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path: Some(path),
            records,
        })
    }

    /// Drop the backing file, keeping the loaded records in memory only
    pub fn detach(mut self) -> Self {
        self.path = None;
        self
    }

    /// Look up the record of a logical contract on a network
    pub fn get(&self, network_id: &str, logical_name: &str) -> Option<&DeploymentRecord> {
        self.records.get(network_id)?.get(logical_name)
    }

    /// Look up only the address of a logical contract on a network
    pub fn address(&self, network_id: &str, logical_name: &str) -> Option<Address> {
        self.get(network_id, logical_name).map(|r| r.address)
    }

    /// All records of a network
    pub fn all(&self, network_id: &str) -> Option<&NetworkRecords> {
        self.records.get(network_id)
    }

    /// Record a new deployment and persist the book.
    ///
    /// Records are never mutated, so recording an already-present
    /// (network, name) pair is rejected, as is a record naming another
    /// network. A record that cannot be persisted is not kept.
    pub fn put(&mut self, network_id: &str, record: DeploymentRecord) -> Result<(), ScriptError> {
        if record.network_id != network_id {
            return Err(ScriptError::WriteDeployments(format!(
                "`{}` names network `{}` and cannot be recorded on `{network_id}`",
                record.logical_name, record.network_id
            )));
        }

        let network = self.records.entry(network_id.to_string()).or_default();
        if let Some(existing) = network.get(&record.logical_name) {
            return Err(ScriptError::WriteDeployments(format!(
                "`{}` is already recorded on `{network_id}` at {:#x}",
                record.logical_name, existing.address
            )));
        }

        let name = record.logical_name.clone();
        network.insert(name.clone(), record);
        if let Err(e) = self.persist() {
            self.forget(network_id, &name);
            return Err(e);
        }
        Ok(())
    }

    /// Drop a record that never reached disk
    fn forget(&mut self, network_id: &str, logical_name: &str) {
        if let Some(network) = self.records.get_mut(network_id) {
            network.remove(logical_name);
            if network.is_empty() {
                self.records.remove(network_id);
            }
        }
    }

    /// Write the book to its backing file, if it has one
    pub fn persist(&self) -> Result<(), ScriptError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        write_atomic(path, json.as_bytes())
    }

    /// The flat `{network: {name: address}}` view of the book
    pub fn addresses(&self) -> BTreeMap<&str, BTreeMap<&str, Address>> {
        self.records
            .iter()
            .map(|(network, records)| {
                let addrs = records
                    .iter()
                    .map(|(name, record)| (name.as_str(), record.address))
                    .collect();
                (network.as_str(), addrs)
            })
            .collect()
    }

    /// Write the flat address view to the given path
    pub fn export(&self, path: &Path) -> Result<(), ScriptError> {
        let json = serde_json::to_string_pretty(&self.addresses())
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        write_atomic(path, json.as_bytes())
    }
}

/// Write `contents` to a sibling temporary file, flush it to disk, then rename
/// it over `path`
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ScriptError> {
    let tmp_path = sibling_with_suffix(path, TMP_FILE_SUFFIX);
    let write_err =
        |e: std::io::Error| ScriptError::WriteDeployments(format!("{}: {e}", path.display()));

    let mut file = File::create(&tmp_path).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)
}

/// `deployments.json` -> `deployments.json.<suffix>`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// A lock file serializing orchestrator runs against a deployments file.
///
/// The lock is released when dropped.
#[derive(Debug)]
pub struct DeploymentLock {
    /// The path of the lock file
    path: PathBuf,
}

impl DeploymentLock {
    /// Acquire the lock guarding the given deployments file
    pub fn acquire(deployments_path: &Path) -> Result<Self, ScriptError> {
        let path = sibling_with_suffix(deployments_path, LOCK_FILE_SUFFIX);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Released again on drop if the owner cannot be recorded
                let lock = Self { path };
                writeln!(file, "{}", std::process::id()).map_err(|e| {
                    ScriptError::WriteDeployments(format!("{}: {e}", lock.path.display()))
                })?;
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ScriptError::config(format!(
                "{} is held by another run; remove it if no deploy is in progress",
                path.display()
            ))),
            Err(e) => Err(ScriptError::WriteDeployments(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }
}

impl Drop for DeploymentLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, B256};
    use tempfile::tempdir;

    use super::*;

    fn record(name: &str, address: Address) -> DeploymentRecord {
        record_on("kovan", name, address)
    }

    fn record_on(network: &str, name: &str, address: Address) -> DeploymentRecord {
        DeploymentRecord {
            logical_name: name.to_string(),
            network_id: network.to_string(),
            address,
            constructor_args_hash: B256::ZERO,
            deployed_at_block: Some(7),
            tx_hash: None,
            artifact: None,
        }
    }

    #[test]
    fn test_put_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let roles = address!("71328517862C481fA7E5Ed39Ffc53fc64c9778e5");

        let mut book = AddressBook::load(&path).unwrap();
        assert!(book.get("kovan", "Roles").is_none());
        book.put("kovan", record("Roles", roles)).unwrap();

        let reloaded = AddressBook::load(&path).unwrap();
        assert_eq!(reloaded.get("kovan", "Roles"), Some(&record("Roles", roles)));
        assert!(reloaded.get("mainnet", "Roles").is_none());
        assert!(!sibling_with_suffix(&path, TMP_FILE_SUFFIX).exists());
    }

    #[test]
    fn test_records_are_never_overwritten() {
        let mut book = AddressBook::in_memory();
        let first = address!("690c6ff4C5DdBAeA4282b109dC145cbA19d13206");
        book.put("kovan", record("Fund", first)).unwrap();

        let err = book.put("kovan", record("Fund", Address::ZERO)).unwrap_err();
        assert!(matches!(err, ScriptError::WriteDeployments(_)));
        assert_eq!(book.address("kovan", "Fund"), Some(first));
    }

    #[test]
    fn test_record_must_name_its_network() {
        let mut book = AddressBook::in_memory();
        let err = book
            .put("kovan", record_on("mainnet", "Roles", Address::ZERO))
            .unwrap_err();
        assert!(matches!(err, ScriptError::WriteDeployments(ref s) if s.contains("mainnet")));
        assert!(book.get("kovan", "Roles").is_none());
        assert!(book.all("kovan").is_none());
    }

    #[test]
    fn test_unpersisted_record_is_not_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("deployments.json");
        let mut book = AddressBook::load(&path).unwrap();

        let err = book.put("kovan", record("Roles", Address::ZERO)).unwrap_err();
        assert!(matches!(err, ScriptError::WriteDeployments(_)));
        assert!(book.get("kovan", "Roles").is_none());
        assert!(book.all("kovan").is_none());

        // Once the directory exists the same record goes through
        fs::create_dir(dir.path().join("missing")).unwrap();
        book.put("kovan", record("Roles", Address::ZERO)).unwrap();
        assert!(AddressBook::load(&path).unwrap().get("kovan", "Roles").is_some());
    }

    #[test]
    fn test_detached_book_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let roles = address!("71328517862C481fA7E5Ed39Ffc53fc64c9778e5");
        let mut book = AddressBook::load(&path).unwrap();
        book.put("kovan", record("Roles", roles)).unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();

        let mut detached = AddressBook::load(&path).unwrap().detach();
        detached.put("kovan", record("Fund", Address::ZERO)).unwrap();
        assert_eq!(detached.address("kovan", "Roles"), Some(roles));
        assert_eq!(detached.address("kovan", "Fund"), Some(Address::ZERO));
        assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);

        // Nothing is created for a book that had no file
        let fresh = dir.path().join("localhost.json");
        let mut detached = AddressBook::load(&fresh).unwrap().detach();
        detached.put("kovan", record("Roles", roles)).unwrap();
        assert!(!fresh.exists());
        assert!(!sibling_with_suffix(&fresh, TMP_FILE_SUFFIX).exists());
    }

    #[test]
    fn test_persisted_layout_is_keyed_by_network() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let mut book = AddressBook::load(&path).unwrap();
        book.put("kovan", record("Roles", Address::ZERO)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json["kovan"]["Roles"]["address"],
            "0x0000000000000000000000000000000000000000"
        );
        assert_eq!(json["kovan"]["Roles"]["deployedAtBlock"], 7);
    }

    #[test]
    fn test_corrupt_file_is_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AddressBook::load(&path),
            Err(ScriptError::ReadDeployments(_))
        ));
    }

    #[test]
    fn test_export_flattens_addresses() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("addresses.json");
        let mut book = AddressBook::in_memory();
        let fund = address!("2AF84B57B9c56D630DB60d4F564254975736C47e");
        book.put("mainnet", record_on("mainnet", "Fund", fund)).unwrap();
        book.export(&out).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(
            json["mainnet"]["Fund"].as_str().unwrap().to_lowercase(),
            format!("{fund:#x}")
        );
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployments.json");

        let lock = DeploymentLock::acquire(&path).unwrap();
        let lock_path = sibling_with_suffix(&path, LOCK_FILE_SUFFIX);
        assert_eq!(
            fs::read_to_string(&lock_path).unwrap().trim(),
            std::process::id().to_string()
        );
        assert!(matches!(
            DeploymentLock::acquire(&path),
            Err(ScriptError::Configuration(_))
        ));
        drop(lock);
        assert!(!lock_path.exists());
        assert!(DeploymentLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_lock_in_missing_directory_is_write_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("deployments.json");
        assert!(matches!(
            DeploymentLock::acquire(&path),
            Err(ScriptError::WriteDeployments(_))
        ));
    }
}
