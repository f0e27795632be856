//! Error kinds raised by the deployment orchestrator.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The literal has more fractional digits than the target precision allows.
    #[error("decimal literal '{literal}' cannot be represented with {precision} decimals")]
    PrecisionOverflow { literal: String, precision: u8 },

    #[error("invalid literal '{literal}': {reason}")]
    InvalidLiteral { literal: String, reason: String },

    /// A lookup required a contract that was never deployed nor overridden.
    #[error("contract '{name}' is not deployed on network '{network}'")]
    NotDeployed { network: String, name: String },

    #[error("deployment of '{name}' failed: {reason}")]
    DeploymentFailed { name: String, reason: String },

    #[error("call {signature} on '{contract}' failed: {reason}")]
    CallFailed {
        contract: String,
        signature: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact '{name}': {reason}")]
    Artifact { name: String, reason: String },

    #[error("connected to chain {actual} but network '{network}' expects chain {expected}")]
    ChainMismatch {
        network: String,
        expected: u64,
        actual: u64,
    },

    #[error("deployment record store {}: {reason}", path.display())]
    Store { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
