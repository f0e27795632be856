//! Idempotent contract deployment.
//!
//! Every deployment is keyed by a logical name. When the [`AddressRegistry`] already resolves
//! the name, the deployer hands back the known address without touching the chain; otherwise
//! it deploys, waits for the receipt and records the new address. Re-running a routine is
//! therefore a no-op for everything it already deployed.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, TxHash},
    sol_types::SolCall,
};

use crate::{
    artifacts::{Artifact, ArtifactSource},
    chain::{ChainClient, TxOverrides, TxReceipt},
    error::{Error, Result},
    registry::{AddressRegistry, AddressSource, DeploymentRecord},
};

/// Artifact used as the proxy of upgradeable deployments.
///
/// Its constructor is `(address logic, address admin, bytes data)`.
pub const PROXY_ARTIFACT: &str = "TransparentUpgradeableProxy";

/// Function of the implementation called through the proxy on creation.
const INITIALIZER: &str = "initialize";

/// A deployed contract bound to its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    /// Logical name the contract is tracked under.
    pub name: String,
    /// Artifact describing the contract's interface.
    pub artifact: String,
    pub address: Address,
}

/// A successful contract creation.
struct Created {
    address: Address,
    transaction_hash: TxHash,
}

/// Deploys contracts and sends calls for one run, reading and writing the run's registry.
pub struct Deployer<'env, C> {
    client: &'env C,
    artifacts: &'env dyn ArtifactSource,
    registry: &'env mut AddressRegistry,
    overrides: TxOverrides,
}

impl<'env, C: ChainClient> Deployer<'env, C> {
    pub fn new(
        client: &'env C,
        artifacts: &'env dyn ArtifactSource,
        registry: &'env mut AddressRegistry,
    ) -> Self {
        Self {
            client,
            artifacts,
            registry,
            overrides: TxOverrides::default(),
        }
    }

    /// Gas settings applied to contract creations.
    pub fn with_overrides(mut self, overrides: TxOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn overrides(&self) -> TxOverrides {
        self.overrides
    }

    pub fn network(&self) -> &str {
        self.registry.network()
    }

    pub fn registry(&self) -> &AddressRegistry {
        &*self.registry
    }

    pub fn client(&self) -> &C {
        self.client
    }

    /// Deploy `artifact` as `name` with `args`, unless `name` already resolves.
    ///
    /// A resolved name is trusted as is: constructor arguments are not compared.
    pub async fn deploy_or_skip(
        &mut self,
        artifact: &str,
        name: &str,
        args: &[DynSolValue],
    ) -> Result<ContractHandle> {
        if let Some(handle) = self.existing(artifact, name) {
            return Ok(handle);
        }

        let compiled = self.artifacts.load(artifact)?;
        let init_code = compiled.deploy_code(args)?;

        let created = self.create(name, init_code).await?;
        self.record(name, &compiled, artifact, &created, None)?;

        Ok(ContractHandle {
            name: name.to_string(),
            artifact: artifact.to_string(),
            address: created.address,
        })
    }

    /// Deploy `artifact` behind a proxy administered by `proxy_admin`, unless `name` already
    /// resolves.
    ///
    /// Non-empty `args` are passed to the implementation's `initialize` through the proxy
    /// constructor. Only the proxy address is tracked under `name`.
    pub async fn deploy_upgradeable_or_skip(
        &mut self,
        artifact: &str,
        name: &str,
        proxy_admin: Address,
        args: &[DynSolValue],
    ) -> Result<ContractHandle> {
        if let Some(handle) = self.existing(artifact, name) {
            return Ok(handle);
        }

        let compiled = self.artifacts.load(artifact)?;
        let proxy = self.artifacts.load(PROXY_ARTIFACT)?;

        // Encode everything up front so bad arguments fail before any transaction.
        let implementation_code = compiled.deploy_code(&[])?;
        let init_data = if args.is_empty() {
            Bytes::new()
        } else {
            compiled.encode_call(INITIALIZER, args)?
        };

        let implementation = self
            .create(&format!("{name} (implementation)"), implementation_code)
            .await?;

        let proxy_code = proxy.deploy_code(&[
            DynSolValue::Address(implementation.address),
            DynSolValue::Address(proxy_admin),
            DynSolValue::Bytes(init_data.to_vec()),
        ])?;
        let created = self.create(name, proxy_code).await?;
        self.record(
            name,
            &compiled,
            artifact,
            &created,
            Some(implementation.address),
        )?;

        Ok(ContractHandle {
            name: name.to_string(),
            artifact: artifact.to_string(),
            address: created.address,
        })
    }

    /// Handle of a contract that must already be deployed or overridden.
    pub fn get_deployed_contract(&self, artifact: &str, name: &str) -> Result<ContractHandle> {
        let address = self.registry.require(name)?;

        Ok(ContractHandle {
            name: name.to_string(),
            artifact: artifact.to_string(),
            address,
        })
    }

    /// Send `call` to `contract` and wait for it to be mined.
    ///
    /// A transport failure or a reverted transaction is a [`Error::CallFailed`].
    pub async fn send<T: SolCall>(
        &self,
        contract: &ContractHandle,
        call: T,
        overrides: TxOverrides,
    ) -> Result<TxReceipt> {
        let failed = |reason: String| Error::CallFailed {
            contract: contract.name.clone(),
            signature: T::SIGNATURE.to_string(),
            reason,
        };

        tracing::info!(
            contract = %contract.name,
            address = %contract.address,
            call = T::SIGNATURE,
            "Sending transaction"
        );

        let tx_hash = self
            .client
            .send_transaction(contract.address, call.abi_encode().into(), overrides)
            .await
            .map_err(|e| failed(format!("{e:#}")))?;

        let receipt = self
            .client
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| failed(format!("{e:#}")))?;

        if !receipt.succeeded() {
            return Err(failed(format!("transaction {tx_hash} reverted")));
        }

        Ok(receipt)
    }

    /// Handle of `name` when the registry resolves it.
    fn existing(&self, artifact: &str, name: &str) -> Option<ContractHandle> {
        let (address, source) = self.registry.resolve_with_source(name)?;

        tracing::info!(
            name = %name,
            address = %address,
            source = %source,
            "Already deployed, skipping"
        );

        if source == AddressSource::Recorded {
            self.warn_if_bytecode_changed(artifact, name);
        }

        Some(ContractHandle {
            name: name.to_string(),
            artifact: artifact.to_string(),
            address,
        })
    }

    /// The recorded instance is kept even when the build changed; this only reports it.
    fn warn_if_bytecode_changed(&self, artifact: &str, name: &str) {
        let Some(recorded) = self
            .registry
            .recorded(name)
            .and_then(|record| record.bytecode_hash.as_deref())
        else {
            return;
        };

        match self.artifacts.load(artifact) {
            Ok(compiled) if compiled.bytecode_hash() != recorded => {
                tracing::warn!(
                    name = %name,
                    artifact = %artifact,
                    "Artifact bytecode changed since the recorded deployment; \
                     override or remove the record to redeploy"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "Cannot compare recorded bytecode");
            }
        }
    }

    async fn create(&self, name: &str, init_code: Bytes) -> Result<Created> {
        let failed = |reason: String| Error::DeploymentFailed {
            name: name.to_string(),
            reason,
        };

        tracing::info!(name = %name, network = %self.network(), "Deploying contract...");

        let tx_hash = self
            .client
            .deploy_contract(init_code, self.overrides)
            .await
            .map_err(|e| failed(format!("{e:#}")))?;

        let receipt = self
            .client
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| failed(format!("{e:#}")))?;

        if !receipt.succeeded() {
            return Err(failed(format!("transaction {tx_hash} reverted")));
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| failed(format!("receipt of {tx_hash} has no contract address")))?;

        tracing::info!(name = %name, address = %address, tx_hash = %tx_hash, "Contract deployed");

        Ok(Created {
            address,
            transaction_hash: tx_hash,
        })
    }

    fn record(
        &mut self,
        name: &str,
        compiled: &Artifact,
        artifact: &str,
        created: &Created,
        implementation: Option<Address>,
    ) -> Result<()> {
        self.registry.record(
            name,
            DeploymentRecord {
                address: created.address,
                artifact: artifact.to_string(),
                transaction_hash: created.transaction_hash,
                implementation,
                bytecode_hash: Some(compiled.bytecode_hash()),
                deployed_at: chrono::Utc::now().timestamp(),
            },
        )
    }
}
