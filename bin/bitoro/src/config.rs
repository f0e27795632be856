//! Layered configuration: a TOML file, then `BITORO_` environment variables, then CLI flags.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use bitoro_deploy::{
    AddressOverride, DEFAULT_ARTIFACT_DIRECTORY, DEFAULT_DEPLOYMENTS_DIRECTORY, DeploymentOptions,
    OverrideTable, TxOverrides, codec, script::ProjectSettings,
};
use figment::{
    Error as FigmentError, Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Prefix of the environment variables layered over the configuration file.
const ENV_PREFIX: &str = "BITORO_";

/// Prefix of the environment variables pinning a contract address, e.g.
/// `BITORO_ADDRESS_OVERRIDE__Reader=0x...`.
const OVERRIDE_ENV_PREFIX: &str = "BITORO_ADDRESS_OVERRIDE__";

/// Decimals of a gwei amount expressed in wei.
const GWEI_DECIMALS: u8 = 9;

/// Errors that can occur when loading or resolving the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(Box<FigmentError>),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Network '{network}' is not configured (known: {known})")]
    UnknownNetwork { network: String, known: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<FigmentError> for ConfigError {
    fn from(err: FigmentError) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BitoroConfig {
    #[serde(default = "default_artifact_directory")]
    pub artifact_directory: PathBuf,

    #[serde(default = "default_deployments_directory")]
    pub deployments_directory: PathBuf,

    /// Node endpoints and gas settings, by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Addresses pinned for every run, merged with `--override` flags.
    #[serde(default)]
    pub address_override: OverrideTable,

    #[serde(default)]
    pub project: ProjectSettings,
}

fn default_artifact_directory() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_DIRECTORY)
}

fn default_deployments_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DEPLOYMENTS_DIRECTORY)
}

/// A node to deploy through.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: Url,

    /// Expected chain id; the run aborts when the node reports another one.
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Sender account, unlocked on the node.
    pub from: Address,

    /// Gas price in gwei, as a decimal string (e.g. "0.1").
    #[serde(default)]
    pub gas_price_gwei: Option<String>,

    #[serde(default)]
    pub gas_limit: Option<u64>,
}

impl NetworkConfig {
    /// Gas settings of the network, the gas price converted to wei.
    pub fn tx_overrides(&self) -> Result<TxOverrides, ConfigError> {
        let mut overrides = TxOverrides::default();

        if let Some(gwei) = &self.gas_price_gwei {
            let wei = codec::to_unit(gwei, GWEI_DECIMALS)
                .map_err(|e| ConfigError::Invalid(format!("gas_price_gwei: {e}")))?;
            let wei = u128::try_from(wei)
                .map_err(|_| ConfigError::Invalid(format!("gas_price_gwei {gwei} is too large")))?;
            overrides = overrides.gas_price(wei);
        }
        if let Some(gas_limit) = self.gas_limit {
            overrides = overrides.gas_limit(gas_limit);
        }

        Ok(overrides)
    }
}

fn is_override_key(key: &str) -> bool {
    key.to_ascii_lowercase().starts_with("address_override.")
}

/// Address overrides from the environment. Contract names keep their case.
fn override_env() -> Env {
    Env::prefixed(OVERRIDE_ENV_PREFIX).lowercase(false)
}

impl BitoroConfig {
    /// Loads configuration from the specified file path.
    ///
    /// Environment variables prefixed with `BITORO_` override file settings, nested keys split
    /// with `__` (e.g. `BITORO_NETWORKS__LOCALHOST__RPC_URL`). Override names are read as
    /// written and resolve case-insensitively.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let figment = Figment::new().merge(Toml::file(path)).merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .filter(|key| !is_override_key(key.as_str())),
        );
        let mut config = figment.extract::<Self>()?;

        let env_overrides = Figment::from(override_env()).extract::<OverrideTable>()?;
        config.address_override = config.address_override.merge(env_overrides);

        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new().merge(Toml::string(content));
        figment.extract::<Self>().map_err(ConfigError::from)
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork {
                network: name.to_string(),
                known: self
                    .networks
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Options of a run on `network`, with the command-line flags applied on top.
    pub fn deployment_options(
        &self,
        network: &str,
        overrides: &[AddressOverride],
        artifacts: Option<PathBuf>,
        deployments: Option<PathBuf>,
    ) -> Result<DeploymentOptions, ConfigError> {
        let network_config = self.network(network)?;

        let cli_overrides = overrides
            .iter()
            .map(|o| (o.name.clone(), o.address))
            .collect::<OverrideTable>();

        Ok(DeploymentOptions {
            network: network.to_string(),
            artifact_directory: artifacts.unwrap_or_else(|| self.artifact_directory.clone()),
            deployments_directory: deployments
                .unwrap_or_else(|| self.deployments_directory.clone()),
            address_override: self.address_override.clone().merge(cli_overrides),
            chain_id: network_config.chain_id,
            overrides: network_config.tx_overrides()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use bitoro_deploy::{AddressRegistry, DeploymentStore};
    use figment::Jail;
    use tempdir::TempDir;

    const CONFIG: &str = r#"
        deployments_directory = "./out/deployments"

        [networks.localhost]
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 31337
        from = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

        [networks.arbitrum]
        rpc_url = "https://arb1.arbitrum.io/rpc"
        chain_id = 42161
        from = "0x1111111111111111111111111111111111111111"
        gas_price_gwei = "100"
        gas_limit = 210000

        [address_override]
        Reader = "0x2222222222222222222222222222222222222222"

        [project]
        liquidity_pool = "0x4242424242424242424242424242424242424242"
        referral_code = "bitoro"
    "#;

    #[test]
    fn test_parse_config() {
        let config = BitoroConfig::parse(CONFIG).expect("Failed to parse config");

        assert_eq!(config.artifact_directory, PathBuf::from(DEFAULT_ARTIFACT_DIRECTORY));
        assert_eq!(config.deployments_directory, PathBuf::from("./out/deployments"));
        assert_eq!(config.networks.len(), 2);
        assert_eq!(config.project.referral_code, "bitoro");
        // Unset project fields keep their defaults.
        assert_eq!(config.project.assets.len(), 7);
    }

    #[test]
    fn test_network_gas_settings() {
        let config = BitoroConfig::parse(CONFIG).unwrap();

        let arbitrum = config.network("arbitrum").unwrap().tx_overrides().unwrap();
        assert_eq!(arbitrum.gas_price, Some(100_000_000_000));
        assert_eq!(arbitrum.gas_limit, Some(210_000));

        let localhost = config.network("localhost").unwrap().tx_overrides().unwrap();
        assert_eq!(localhost, TxOverrides::default());
    }

    #[test]
    fn test_unknown_network() {
        let config = BitoroConfig::parse(CONFIG).unwrap();
        let err = config.network("goerli").unwrap_err();
        assert!(err.to_string().contains("arbitrum, localhost"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = BitoroConfig::parse(CONFIG).unwrap();
        let reader = address!("0x3333333333333333333333333333333333333333");
        let flags = [AddressOverride {
            name: "Reader".to_string(),
            address: reader,
        }];

        let options = config
            .deployment_options("arbitrum", &flags, Some(PathBuf::from("./build")), None)
            .expect("Failed to resolve options");

        assert_eq!(options.network, "arbitrum");
        assert_eq!(options.chain_id, Some(42161));
        assert_eq!(options.artifact_directory, PathBuf::from("./build"));
        assert_eq!(options.address_override.get("Reader"), Some(&reader));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("bitoro-test").unwrap();
        let result = BitoroConfig::load_from(temp_dir.path().join("Bitoro.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_env_overrides_resolve_contract_names() {
        Jail::expect_with(|jail| {
            jail.create_file("Bitoro.toml", CONFIG)?;
            jail.set_env(
                "BITORO_ADDRESS_OVERRIDE__READER",
                "0x4444444444444444444444444444444444444444",
            );
            jail.set_env(
                "BITORO_ADDRESS_OVERRIDE__GmxAdapter",
                "0x5555555555555555555555555555555555555555",
            );
            jail.set_env("BITORO_NETWORKS__LOCALHOST__CHAIN_ID", "1337");

            let config = BitoroConfig::load_from("Bitoro.toml").map_err(|e| e.to_string())?;

            assert_eq!(
                config.address_override.get("GmxAdapter"),
                Some(&address!("0x5555555555555555555555555555555555555555"))
            );
            assert_eq!(config.address_override.len(), 2);
            // Upper-cased in the environment, still replaces the file's `Reader`.
            let options = config
                .deployment_options("localhost", &[], None, None)
                .map_err(|e| e.to_string())?;
            let registry = AddressRegistry::open(
                "localhost",
                options.address_override,
                DeploymentStore::new(jail.directory()),
            )
            .map_err(|e| e.to_string())?;
            assert_eq!(
                registry.resolve("Reader"),
                Some(address!("0x4444444444444444444444444444444444444444"))
            );

            // Other keys are still lower-cased and nested.
            assert_eq!(config.network("localhost").unwrap().chain_id, Some(1337));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new("bitoro-test").unwrap();
        let path = temp_dir.path().join("Bitoro.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = BitoroConfig::load_from(&path).expect("Failed to load config");
        assert!(config.networks.contains_key("localhost"));
    }
}
