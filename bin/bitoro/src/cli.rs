use std::path::PathBuf;

use bitoro_deploy::{AddressOverride, script::FACTORY};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// The default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "Bitoro.toml";

/// The default network.
const DEFAULT_NETWORK: &str = "localhost";

#[derive(Parser)]
#[command(name = "bitoro")]
#[command(
    author,
    version,
    about = "Deploy and configure the Bitoro proxy factory, skipping anything already deployed"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "BITORO_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    #[arg(short, long, env = "BITORO_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// The network to deploy to, as named in the `[networks]` section of the configuration.
    ///
    /// Also names the deployment record file: <deployments>/<network>.json
    #[arg(short, long, env = "BITORO_NETWORK", default_value = DEFAULT_NETWORK, global = true)]
    pub network: String,

    /// Pin a contract to an existing address for this run, e.g. `--override Reader=0x...`.
    ///
    /// Overrides take precedence over recorded deployments and are never persisted.
    /// Can be repeated.
    #[arg(long = "override", value_name = "NAME=ADDRESS", global = true)]
    pub overrides: Vec<AddressOverride>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, alias = "artifact-directory", env = "BITORO_ARTIFACTS", global = true)]
    pub artifacts: Option<PathBuf>,

    /// Directory holding the per-network deployment records.
    #[arg(long, alias = "deployments-directory", env = "BITORO_DEPLOYMENTS", global = true)]
    pub deployments: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Deploy the proxy factory.
    Deploy,
    /// Deploy the project contracts and configure the factory.
    Init,
    /// Run `deploy` then `init`.
    All,
    /// Print the deployments recorded for the network.
    Status,
    /// Ask the node to verify a deployed contract.
    Verify {
        /// Logical name of the contract.
        #[arg(default_value = FACTORY)]
        contract: String,
    },
}
