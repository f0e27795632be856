//! Address registry: resolves logical contract names to deployed addresses.
//!
//! Addresses come from two places, in order of precedence:
//! 1. the [`OverrideTable`] supplied for the current run,
//! 2. the [`DeploymentStore`], one JSON file per network under the deployments directory.
//!
//! Every [`AddressRegistry::record`] is persisted with an atomic replace before it returns, so
//! a crash either keeps the previous file or the new one, never a partial write.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::primitives::{Address, TxHash};
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Caller-supplied addresses that take precedence over recorded deployments for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct OverrideTable(BTreeMap<String, Address>);

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override, replacing any previous entry for the same name.
    pub fn with(mut self, name: impl Into<String>, address: Address) -> Self {
        self.0.insert(name.into(), address);
        self
    }

    /// Address pinned for `name`. An exact match wins; otherwise names compare ASCII
    /// case-insensitively, since environment variables rarely keep mixed case.
    pub fn lookup(&self, name: &str) -> Option<Address> {
        self.0.get(name).copied().or_else(|| {
            self.0
                .iter()
                .find(|(pinned, _)| pinned.eq_ignore_ascii_case(name))
                .map(|(_, address)| *address)
        })
    }

    /// Merge `other` into this table, `other` winning on conflicts. Names differing only in
    /// case are the same contract.
    pub fn merge(mut self, other: OverrideTable) -> Self {
        for (name, address) in other.0 {
            self.0.retain(|pinned, _| !pinned.eq_ignore_ascii_case(&name));
            self.0.insert(name, address);
        }
        self
    }
}

impl FromIterator<(String, Address)> for OverrideTable {
    fn from_iter<I: IntoIterator<Item = (String, Address)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single `Name=0xaddress` override, as accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOverride {
    pub name: String,
    pub address: Address,
}

impl FromStr for AddressOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, address) = s.split_once('=').ok_or_else(|| {
            Error::InvalidConfig(format!("override '{s}' must be of the form Name=0xaddress"))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "override '{s}' has an empty contract name"
            )));
        }

        let address = address.trim().parse::<Address>().map_err(|e| Error::InvalidLiteral {
            literal: address.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            address,
        })
    }
}

/// The current deployment of one logical contract on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Address the logical name resolves to (the proxy for upgradeable deployments).
    pub address: Address,
    /// Artifact the contract was built from.
    pub artifact: String,
    /// Transaction that created `address`.
    pub transaction_hash: TxHash,
    /// Implementation behind the proxy, kept for reference only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    /// SHA-256 of the creation bytecode at deployment time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode_hash: Option<String>,
    /// Unix timestamp of the deployment.
    pub deployed_at: i64,
}

/// Durable record store, one JSON file per network.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    directory: PathBuf,
}

impl DeploymentStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the record file for `network`.
    ///
    /// The network name must be a plain file stem so the file stays inside the directory.
    pub fn path(&self, network: &str) -> Result<PathBuf> {
        if network.is_empty()
            || network.contains(['/', '\\'])
            || network.contains("..")
            || Path::new(network).is_absolute()
        {
            return Err(Error::InvalidConfig(format!(
                "network name '{network}' cannot be used as a record file name"
            )));
        }
        Ok(self.directory.join(format!("{network}.json")))
    }

    /// Load every record of `network`. A missing file is an empty store.
    pub fn load(&self, network: &str) -> Result<BTreeMap<String, DeploymentRecord>> {
        let path = self.path(network)?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No deployment records yet");
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
        serde_json::from_str(&content).map_err(|e| store_error(&path, e))
    }

    /// Atomically replace the records of `network`.
    ///
    /// The content goes to a sibling temporary file which is synced and then renamed over the
    /// record file.
    pub fn save(&self, network: &str, records: &BTreeMap<String, DeploymentRecord>) -> Result<()> {
        let path = self.path(network)?;
        fs::create_dir_all(&self.directory).map_err(|e| store_error(&self.directory, e))?;

        let content = serde_json::to_string_pretty(records).map_err(|e| store_error(&path, e))?;

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path).map_err(|e| store_error(&tmp_path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| store_error(&tmp_path, e))?;
            file.sync_all().map_err(|e| store_error(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| store_error(&path, e))?;
        sync_directory(&self.directory)?;

        tracing::debug!(path = %path.display(), records = records.len(), "Deployment records saved");
        Ok(())
    }

    /// Sync the record file of `network` to disk, if it exists.
    pub fn sync(&self, network: &str) -> Result<()> {
        let path = self.path(network)?;
        if !path.exists() {
            return Ok(());
        }
        File::open(&path)
            .and_then(|file| file.sync_all())
            .map_err(|e| store_error(&path, e))
    }
}

#[cfg(unix)]
fn sync_directory(directory: &Path) -> Result<()> {
    File::open(directory)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| store_error(directory, e))
}

#[cfg(not(unix))]
fn sync_directory(_directory: &Path) -> Result<()> {
    Ok(())
}

fn store_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Store {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Where a resolved address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AddressSource {
    Override,
    Recorded,
}

/// Registry of deployed addresses for the network selected for the run.
#[derive(Debug)]
pub struct AddressRegistry {
    network: String,
    overrides: OverrideTable,
    store: DeploymentStore,
    records: BTreeMap<String, DeploymentRecord>,
}

impl AddressRegistry {
    /// Open the registry of `network`, loading its persisted records.
    pub fn open(
        network: impl Into<String>,
        overrides: OverrideTable,
        store: DeploymentStore,
    ) -> Result<Self> {
        let network = network.into();
        let records = store.load(&network)?;

        tracing::debug!(
            network = %network,
            recorded = records.len(),
            overrides = overrides.len(),
            "Address registry opened"
        );

        Ok(Self {
            network,
            overrides,
            store,
            records,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Every persisted record of the network, ordered by logical name.
    pub fn records(&self) -> &BTreeMap<String, DeploymentRecord> {
        &self.records
    }

    /// The persisted record of `name`, ignoring overrides.
    pub fn recorded(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.get(name)
    }

    /// Resolve `name` to an address: override first, then the persisted record.
    pub fn resolve(&self, name: &str) -> Option<Address> {
        self.resolve_with_source(name).map(|(address, _)| address)
    }

    pub fn resolve_with_source(&self, name: &str) -> Option<(Address, AddressSource)> {
        if let Some(address) = self.overrides.lookup(name) {
            return Some((address, AddressSource::Override));
        }
        self.records
            .get(name)
            .map(|record| (record.address, AddressSource::Recorded))
    }

    /// Like [`Self::resolve`], but an unresolved name is a [`Error::NotDeployed`].
    pub fn require(&self, name: &str) -> Result<Address> {
        self.resolve(name).ok_or_else(|| Error::NotDeployed {
            network: self.network.clone(),
            name: name.to_string(),
        })
    }

    /// Record `record` as the current deployment of `name` and persist it.
    ///
    /// The in-memory view is only updated once the store accepted the write.
    pub fn record(&mut self, name: impl Into<String>, record: DeploymentRecord) -> Result<()> {
        let name = name.into();

        let mut records = self.records.clone();
        if let Some(previous) = records.insert(name.clone(), record) {
            tracing::info!(
                name = %name,
                previous = %previous.address,
                "Superseding recorded deployment"
            );
        }

        self.store.save(&self.network, &records)?;
        self.records = records;
        Ok(())
    }

    /// Make sure every record written during the run is on disk.
    pub fn flush(&self) -> Result<()> {
        self.store.sync(&self.network)
    }
}
