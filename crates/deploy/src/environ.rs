//! Scoped execution environment for a deployment routine.
//!
//! [`Environ::run`] selects the network, opens its address registry, hands a live [`Deployer`]
//! to the routine and flushes the registry on every exit path. On-chain effects of a failed
//! routine are never rolled back: records written before the failure stay persisted, so
//! re-running the routine resumes where it stopped.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;

use crate::{
    artifacts::{ArtifactSource, HardhatArtifacts},
    chain::{ChainClient, TxOverrides},
    deployer::Deployer,
    error::Error,
    registry::{AddressRegistry, DeploymentStore, OverrideTable},
};

/// Default location of compiled artifacts.
pub const DEFAULT_ARTIFACT_DIRECTORY: &str = "./artifacts/contracts";
/// Default location of the per-network deployment records.
pub const DEFAULT_DEPLOYMENTS_DIRECTORY: &str = "./deployments";

/// Everything a run needs to know about where it deploys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Network name; also names the record file.
    pub network: String,
    pub artifact_directory: PathBuf,
    pub deployments_directory: PathBuf,
    /// Addresses pinned for this run only.
    pub address_override: OverrideTable,
    /// Expected chain id of the network, checked against the node when set.
    pub chain_id: Option<u64>,
    /// Gas settings applied to contract creations.
    pub overrides: TxOverrides,
}

impl DeploymentOptions {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            artifact_directory: PathBuf::from(DEFAULT_ARTIFACT_DIRECTORY),
            deployments_directory: PathBuf::from(DEFAULT_DEPLOYMENTS_DIRECTORY),
            address_override: OverrideTable::default(),
            chain_id: None,
            overrides: TxOverrides::default(),
        }
    }
}

/// A run of a deployment routine against one network.
pub struct Environ<C> {
    options: DeploymentOptions,
    client: C,
    artifacts: Box<dyn ArtifactSource>,
}

impl<C: ChainClient> Environ<C> {
    /// Environment reading Hardhat artifacts from the configured artifact directory.
    pub fn new(options: DeploymentOptions, client: C) -> Self {
        let artifacts = Box::new(HardhatArtifacts::new(options.artifact_directory.clone()));
        Self {
            options,
            client,
            artifacts,
        }
    }

    /// Replace the artifact source.
    pub fn with_artifacts(mut self, artifacts: impl ArtifactSource + 'static) -> Self {
        self.artifacts = Box::new(artifacts);
        self
    }

    pub fn options(&self) -> &DeploymentOptions {
        &self.options
    }

    /// Run `routine` with a deployer bound to this environment.
    ///
    /// The routine's error is returned unchanged; the registry is flushed either way.
    pub async fn run<R>(self, routine: R) -> anyhow::Result<()>
    where
        R: AsyncFnOnce(&mut Deployer<'_, C>) -> anyhow::Result<()>,
    {
        let Self {
            options,
            client,
            artifacts,
        } = self;

        let chain_id = client
            .chain_id()
            .await
            .with_context(|| format!("Failed to connect to network '{}'", options.network))?;

        if let Some(expected) = options.chain_id {
            if expected != chain_id {
                return Err(Error::ChainMismatch {
                    network: options.network.clone(),
                    expected,
                    actual: chain_id,
                }
                .into());
            }
        }

        let mut registry = AddressRegistry::open(
            &options.network,
            options.address_override.clone(),
            DeploymentStore::new(&options.deployments_directory),
        )?;

        tracing::info!(
            network = %options.network,
            chain_id,
            recorded = registry.records().len(),
            overrides = registry.overrides().len(),
            "Environment ready"
        );

        let outcome = {
            let mut deployer = Deployer::new(&client, artifacts.as_ref(), &mut registry)
                .with_overrides(options.overrides);
            routine(&mut deployer).await
        };

        let flushed = registry.flush();

        match outcome {
            Ok(()) => {
                flushed.context("Failed to flush deployment records")?;
                tracing::info!(network = %options.network, "Deployment routine completed");
                Ok(())
            }
            Err(err) => {
                if let Err(flush_err) = flushed {
                    tracing::error!(error = %flush_err, "Failed to flush deployment records");
                }
                tracing::error!(
                    network = %options.network,
                    recorded = registry.records().len(),
                    "Deployment routine failed; recorded deployments are kept, re-run to resume"
                );
                Err(err)
            }
        }
    }
}

/// Translate the outcome of a run into a process exit code, reporting failures on stderr.
pub fn exit_code(outcome: &anyhow::Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
