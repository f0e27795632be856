//! bitoro-deploy - Idempotent contract deployment for the Bitoro proxy factory.
//!
//! This crate deploys contracts from compiled artifacts, tracks their addresses per network
//! and re-runs safely: anything already deployed or overridden is reused instead of redeployed.

mod error;
pub use error::{Error, Result};

pub mod codec;

mod registry;
pub use registry::{
    AddressOverride, AddressRegistry, AddressSource, DeploymentRecord, DeploymentStore,
    OverrideTable,
};

mod artifacts;
pub use artifacts::{Artifact, ArtifactSource, HardhatArtifacts};

mod rpc;

mod chain;
pub use chain::{
    ChainClient, DEFAULT_POLL_INTERVAL, JsonRpcClient, TxOverrides, TxReceipt,
    VERIFY_CONTRACT_METHOD,
};

mod deployer;
pub use deployer::{ContractHandle, Deployer, PROXY_ARTIFACT};

mod environ;
pub use environ::{
    DEFAULT_ARTIFACT_DIRECTORY, DEFAULT_DEPLOYMENTS_DIRECTORY, DeploymentOptions, Environ,
    exit_code,
};

pub mod factory;
pub mod script;
