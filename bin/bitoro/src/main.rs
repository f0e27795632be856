//! bitoro deploys the Bitoro proxy factory and registers its GMX project, resuming safely after
//! any failure.

mod cli;
mod config;

use std::process::ExitCode;

use anyhow::{Context, Result};
use bitoro_deploy::{
    AddressRegistry, DeploymentOptions, DeploymentStore, Environ, JsonRpcClient, exit_code,
    script::{self, Phase},
};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use config::{BitoroConfig, NetworkConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let outcome = run(cli).await;
    exit_code(&outcome)
}

async fn run(cli: Cli) -> Result<()> {
    let config = BitoroConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let options = config.deployment_options(
        &cli.network,
        &cli.overrides,
        cli.artifacts.clone(),
        cli.deployments.clone(),
    )?;
    let network = config.network(&cli.network)?;

    let phase = match &cli.command {
        Command::Deploy => Phase::Deploy,
        Command::Init => Phase::Init,
        Command::All => Phase::All,
        Command::Status => {
            println!("Network: {}", options.network);
            println!("{}", status_table(&open_registry(&options)?));
            return Ok(());
        }
        Command::Verify { contract } => return verify(network, &options, contract).await,
    };

    tracing::info!(
        config_path = %cli.config.display(),
        network = %options.network,
        rpc_url = %network.rpc_url,
        from = %network.from,
        phase = %phase,
        "Starting deployment..."
    );

    let client = JsonRpcClient::new(network.rpc_url.clone(), network.from)?;
    let settings = &config.project;

    Environ::new(options, client)
        .run(async |deployer| script::run(deployer, settings, phase).await)
        .await
}

fn open_registry(options: &DeploymentOptions) -> Result<AddressRegistry> {
    Ok(AddressRegistry::open(
        &options.network,
        options.address_override.clone(),
        DeploymentStore::new(&options.deployments_directory),
    )?)
}

/// Ask the node to verify the contract `contract` resolves to on the selected network.
async fn verify(network: &NetworkConfig, options: &DeploymentOptions, contract: &str) -> Result<()> {
    let address = open_registry(options)?.require(contract)?;

    tracing::info!(
        contract = %contract,
        address = %address,
        network = %options.network,
        "Verifying contract..."
    );

    let client = JsonRpcClient::new(network.rpc_url.clone(), network.from)?;
    let verification = client
        .verify_contract(address, &options.network)
        .await
        .with_context(|| format!("Failed to verify {contract} at {address}"))?;

    tracing::info!(contract = %contract, result = %verification, "Verification result");
    Ok(())
}

/// The addresses the network resolves to, recorded ones first.
fn status_table(registry: &AddressRegistry) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Name",
        "Address",
        "Source",
        "Artifact",
        "Implementation",
        "Deployed at",
    ]);

    for (name, record) in registry.records() {
        let deployed_at = chrono::DateTime::from_timestamp(record.deployed_at, 0)
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();

        table.add_row(vec![
            name.clone(),
            record.address.to_string(),
            if registry.overrides().lookup(name).is_some() {
                "recorded (overridden)".to_string()
            } else {
                "recorded".to_string()
            },
            record.artifact.clone(),
            record
                .implementation
                .map(|address| address.to_string())
                .unwrap_or_default(),
            deployed_at,
        ]);
    }

    for (name, address) in registry.overrides().iter() {
        table.add_row(vec![
            name.clone(),
            address.to_string(),
            "override".to_string(),
            String::new(),
            String::new(),
            String::new(),
        ]);
    }

    table
}
