//! Compiled contract artifacts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A compiled contract: its ABI and creation bytecode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Creation code: the bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_code(&self, args: &[DynSolValue]) -> Result<Bytes> {
        if self.bytecode.is_empty() {
            return Err(self.error("has no creation bytecode (abstract contract or interface?)"));
        }

        let encoded_args = match self.abi.constructor() {
            Some(constructor) => constructor
                .abi_encode_input(args)
                .map_err(|e| self.error(format!("invalid constructor arguments: {e}")))?,
            None if args.is_empty() => Vec::new(),
            None => {
                return Err(self.error(format!(
                    "has no constructor but {} arguments were given",
                    args.len()
                )));
            }
        };

        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encoded_args);
        Ok(code.into())
    }

    /// Calldata for `method(args...)`, using the first overload that accepts `args`.
    pub fn encode_call(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes> {
        let functions = self
            .abi
            .function(method)
            .ok_or_else(|| self.error(format!("has no function '{method}'")))?;

        functions
            .iter()
            .find_map(|function| function.abi_encode_input(args).ok())
            .map(Bytes::from)
            .ok_or_else(|| self.error(format!("no overload of '{method}' accepts the arguments")))
    }

    /// Hex-encoded SHA-256 of the creation bytecode.
    pub fn bytecode_hash(&self) -> String {
        hex::encode(Sha256::digest(&self.bytecode))
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Artifact {
            name: self.contract_name.clone(),
            reason: reason.into(),
        }
    }
}

/// Lookup of compiled artifacts by contract name.
pub trait ArtifactSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Artifact>;
}

/// Artifacts laid out by Hardhat: `<root>/**/<Name>.sol/<Name>.json`.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find `<name>.json` anywhere under the root. Debug files (`*.dbg.json`) never match.
    fn find(&self, name: &str) -> Result<Option<PathBuf>> {
        let file_name = format!("{name}.json");
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| Error::Artifact {
                name: name.to_string(),
                reason: format!("cannot read {}: {e}", dir.display()),
            })?;

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.file_name().is_some_and(|f| f == file_name.as_str()) {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }
}

impl ArtifactSource for HardhatArtifacts {
    fn load(&self, name: &str) -> Result<Artifact> {
        let artifact_error = |reason: String| Error::Artifact {
            name: name.to_string(),
            reason,
        };

        let path = self.find(name)?.ok_or_else(|| {
            artifact_error(format!("not found under {}", self.root.display()))
        })?;

        let content = fs::read_to_string(&path)
            .map_err(|e| artifact_error(format!("cannot read {}: {e}", path.display())))?;
        let artifact: Artifact = serde_json::from_str(&content)
            .map_err(|e| artifact_error(format!("malformed {}: {e}", path.display())))?;

        tracing::debug!(name = %name, path = %path.display(), "Artifact loaded");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Address;
    use tempdir::TempDir;

    const READER_ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "Reader",
        "sourceName": "contracts/Reader.sol",
        "abi": [
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "factory", "type": "address", "internalType": "address" },
                    { "name": "vault", "type": "address", "internalType": "address" }
                ]
            },
            {
                "type": "function",
                "name": "initialize",
                "stateMutability": "nonpayable",
                "inputs": [ { "name": "owner", "type": "address", "internalType": "address" } ],
                "outputs": []
            }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080"
    }"#;

    fn write_artifact(root: &Path) {
        let dir = root.join("Reader.sol");
        fs::create_dir_all(&dir).expect("Failed to create artifact dir");
        fs::write(dir.join("Reader.json"), READER_ARTIFACT).expect("Failed to write artifact");
        fs::write(dir.join("Reader.dbg.json"), "{}").expect("Failed to write debug file");
    }

    #[test]
    fn test_load_nested_artifact() {
        let temp_dir = TempDir::new("bitoro-test").expect("Failed to create temp dir");
        write_artifact(&temp_dir.path().join("aggregators"));

        let artifact = HardhatArtifacts::new(temp_dir.path())
            .load("Reader")
            .expect("Failed to load artifact");

        assert_eq!(artifact.contract_name, "Reader");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_load_missing_artifact() {
        let temp_dir = TempDir::new("bitoro-test").expect("Failed to create temp dir");
        let result = HardhatArtifacts::new(temp_dir.path()).load("ProxyFactory");
        assert!(matches!(result, Err(Error::Artifact { .. })));
    }

    #[test]
    fn test_deploy_code_appends_constructor_args() {
        let artifact: Artifact = serde_json::from_str(READER_ARTIFACT).unwrap();
        let args = [
            DynSolValue::Address(Address::repeat_byte(0x11)),
            DynSolValue::Address(Address::repeat_byte(0x22)),
        ];

        let code = artifact.deploy_code(&args).expect("Failed to encode");

        assert_eq!(code.len(), 5 + 2 * 32);
        assert_eq!(&code[..5], artifact.bytecode.as_ref());
        assert_eq!(&code[5 + 12..5 + 32], Address::repeat_byte(0x11).as_slice());
    }

    #[test]
    fn test_deploy_code_rejects_wrong_arity() {
        let artifact: Artifact = serde_json::from_str(READER_ARTIFACT).unwrap();
        let result = artifact.deploy_code(&[DynSolValue::Address(Address::ZERO)]);
        assert!(matches!(result, Err(Error::Artifact { .. })));
    }

    #[test]
    fn test_encode_call() {
        let artifact: Artifact = serde_json::from_str(READER_ARTIFACT).unwrap();
        let calldata = artifact
            .encode_call("initialize", &[DynSolValue::Address(Address::ZERO)])
            .expect("Failed to encode");
        assert_eq!(calldata.len(), 4 + 32);

        assert!(artifact.encode_call("missing", &[]).is_err());
    }

    #[test]
    fn test_bytecode_hash_is_stable() {
        let artifact: Artifact = serde_json::from_str(READER_ARTIFACT).unwrap();
        assert_eq!(artifact.bytecode_hash(), artifact.clone().bytecode_hash());
        assert_eq!(artifact.bytecode_hash().len(), 64);
    }
}
