//! Registration of the GMX trading project on the proxy factory.
//!
//! The routine runs in two phases:
//! - [`deploy`] deploys the factory itself,
//! - [`init`] deploys the project contracts and configures the factory: project config, every
//!   asset's trading config and every asset's borrow config.
//!
//! Every payload is built and validated before the first transaction of a phase is sent.

use std::collections::HashSet;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256, address},
};
use serde::{Deserialize, Serialize};

use crate::{
    chain::ChainClient,
    codec::bytes32_string,
    deployer::Deployer,
    error::{Error, Result},
    factory::{
        AssetRates, BorrowConfig, IProxyFactory, NO_BORROW_SLOT, ProjectAssetConfig,
        ProjectConfig,
    },
};

/// Logical name and artifact of the proxy factory.
pub const FACTORY: &str = "ProxyFactory";
/// Logical name and artifact of the GMX adapter implementation.
pub const GMX_ADAPTER: &str = "GmxAdapter";
/// Logical name and artifact of the reader.
pub const READER: &str = "Reader";

/// Project id of the GMX integration.
pub const PROJECT_GMX: u64 = 1;

/// Which part of the routine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    Deploy,
    Init,
    All,
}

/// GMX contracts the project trades through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmxSettings {
    pub vault: Address,
    pub position_router: Address,
    pub order_book: Address,
    pub router: Address,
    pub usdg: Address,
}

impl Default for GmxSettings {
    fn default() -> Self {
        // GMX v1 on Arbitrum One.
        Self {
            vault: address!("0x489ee077994B6658eAfA855C308275EAd8097C4A"),
            position_router: address!("0xb87a436B93fFE9D75c5cFA7bAcFff96430b09868"),
            order_book: address!("0x09f77E8A13De9a35a7231028187e9fD5DB8a2ACB"),
            router: address!("0xaBBc5F99639c9B6bCb58544ddf04EFA6802F4064"),
            usdg: address!("0x45096e7aA921f27590f8F19e457794EB09678141"),
        }
    }
}

/// Borrow slot of an asset with a human-readable cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowSettings {
    pub asset_id: u8,
    pub cap: String,
    /// Native decimals of the asset token.
    pub decimals: u8,
}

/// One collateral asset of the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub symbol: String,
    pub address: Address,
    pub rates: AssetRates,
    pub borrow: BorrowSettings,
}

/// Settings of the project registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub project_id: u64,
    pub weth: Address,
    /// Liquidity pool the factory borrows from. Has no default and must be configured.
    pub liquidity_pool: Address,
    /// Admin of the factory proxy. The factory is deployed without a proxy when unset.
    pub proxy_admin: Option<Address>,
    pub gmx: GmxSettings,
    pub referral_code: String,
    pub market_order_timeout_seconds: u64,
    pub limit_order_timeout_seconds: u64,
    pub funding_asset_id: u8,
    /// Gas limit of configuration calls, on top of the network's gas settings.
    pub call_gas_limit: Option<u64>,
    pub assets: Vec<AssetSettings>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        let weth = address!("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1");
        Self {
            project_id: PROJECT_GMX,
            weth,
            liquidity_pool: Address::ZERO,
            proxy_admin: None,
            gmx: GmxSettings::default(),
            referral_code: String::new(),
            market_order_timeout_seconds: 120,
            limit_order_timeout_seconds: 86400 * 2,
            funding_asset_id: 3,
            call_gas_limit: Some(210_000),
            assets: vec![
                asset("USDC", address!("0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8"), 0, "100000", 6),
                asset("USDT", address!("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"), 1, "100000", 6),
                asset("DAI", address!("0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), 2, "0", 18),
                asset("WETH", weth, 3, "85", 18),
                asset("WBTC", address!("0x2f2a2543B76A4166549F7aaB2e75Bef0aefC5B0f"), 4, "4", 8),
                asset("UNI", address!("0xFa7F8980b0f1E64A2062791cc3b0871572f1F7f0"), NO_BORROW_SLOT, "0", 18),
                asset("LINK", address!("0xf97f4df75117a78c1A5a0DBb814Af92458539FB4"), NO_BORROW_SLOT, "0", 18),
            ],
        }
    }
}

fn asset(symbol: &str, address: Address, asset_id: u8, cap: &str, decimals: u8) -> AssetSettings {
    AssetSettings {
        symbol: symbol.to_string(),
        address,
        rates: AssetRates {
            boost_fee_rate: "0.02".to_string(),
            initial_margin_rate: "0.006".to_string(),
            maintenance_margin_rate: "0.005".to_string(),
            liquidation_fee_rate: "0.00".to_string(),
            reference_oracle: 0,
            reference_deviation: "0.001".to_string(),
        },
        borrow: BorrowSettings {
            asset_id,
            cap: cap.to_string(),
            decimals,
        },
    }
}

/// Validated payloads of the init phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPlan {
    pub project_id: U256,
    pub project: ProjectConfig,
    pub assets: Vec<(String, Address, ProjectAssetConfig)>,
    pub borrows: Vec<(String, Address, BorrowConfig)>,
}

impl ProjectSettings {
    /// Build and validate every payload of the init phase.
    pub fn plan(&self) -> Result<InitPlan> {
        if self.weth.is_zero() {
            return Err(Error::InvalidConfig("weth address is not set".to_string()));
        }
        if self.liquidity_pool.is_zero() {
            return Err(Error::InvalidConfig(
                "liquidity pool address is not set".to_string(),
            ));
        }

        let project = ProjectConfig {
            vault: self.gmx.vault,
            position_router: self.gmx.position_router,
            order_book: self.gmx.order_book,
            router: self.gmx.router,
            referral_code: bytes32_string(&self.referral_code)?,
            market_order_timeout_seconds: self.market_order_timeout_seconds,
            limit_order_timeout_seconds: self.limit_order_timeout_seconds,
            funding_asset_id: self.funding_asset_id,
        };
        project.encode()?;

        let mut seen_assets = HashSet::new();
        let mut seen_slots = HashSet::new();
        let mut assets = Vec::with_capacity(self.assets.len());
        let mut borrows = Vec::with_capacity(self.assets.len());

        for asset in &self.assets {
            let invalid = |e: Error| match e {
                Error::InvalidConfig(reason) => {
                    Error::InvalidConfig(format!("asset {}: {reason}", asset.symbol))
                }
                other => other,
            };

            if !seen_assets.insert(asset.address) {
                return Err(Error::InvalidConfig(format!(
                    "asset {} ({}) is listed twice",
                    asset.symbol, asset.address
                )));
            }
            if asset.borrow.asset_id != NO_BORROW_SLOT && !seen_slots.insert(asset.borrow.asset_id)
            {
                return Err(Error::InvalidConfig(format!(
                    "asset {}: borrow slot {} is already taken",
                    asset.symbol, asset.borrow.asset_id
                )));
            }

            let config = ProjectAssetConfig::from_rates(&asset.rates).map_err(invalid)?;
            let borrow =
                BorrowConfig::new(asset.borrow.asset_id, &asset.borrow.cap, asset.borrow.decimals)
                    .map_err(invalid)?;

            assets.push((asset.symbol.clone(), asset.address, config));
            borrows.push((asset.symbol.clone(), asset.address, borrow));
        }

        // Borrowable assets are opened first, zero caps follow; otherwise config order.
        borrows.sort_by_key(|(_, _, borrow)| borrow.borrow_cap.is_zero());

        Ok(InitPlan {
            project_id: U256::from(self.project_id),
            project,
            assets,
            borrows,
        })
    }
}

/// Run `phase` of the registration.
pub async fn run<C: ChainClient>(
    deployer: &mut Deployer<'_, C>,
    settings: &ProjectSettings,
    phase: Phase,
) -> anyhow::Result<()> {
    match phase {
        Phase::Deploy => deploy(deployer, settings).await,
        Phase::Init => init(deployer, settings).await,
        Phase::All => {
            deploy(deployer, settings).await?;
            init(deployer, settings).await
        }
    }
}

/// Deploy the proxy factory, behind a proxy when an admin is configured.
pub async fn deploy<C: ChainClient>(
    deployer: &mut Deployer<'_, C>,
    settings: &ProjectSettings,
) -> anyhow::Result<()> {
    let factory = match settings.proxy_admin {
        Some(proxy_admin) => {
            deployer
                .deploy_upgradeable_or_skip(FACTORY, FACTORY, proxy_admin, &[])
                .await?
        }
        None => deployer.deploy_or_skip(FACTORY, FACTORY, &[]).await?,
    };

    tracing::info!(address = %factory.address, "Factory ready");
    Ok(())
}

/// Deploy the project contracts and configure the factory.
pub async fn init<C: ChainClient>(
    deployer: &mut Deployer<'_, C>,
    settings: &ProjectSettings,
) -> anyhow::Result<()> {
    let plan = settings.plan()?;
    let factory = deployer.get_deployed_contract(FACTORY, FACTORY)?;

    let adapter = deployer
        .deploy_or_skip(GMX_ADAPTER, GMX_ADAPTER, &[DynSolValue::Address(settings.weth)])
        .await?;
    let reader = deployer
        .deploy_or_skip(
            READER,
            READER,
            &[
                DynSolValue::Address(factory.address),
                DynSolValue::Address(settings.gmx.vault),
                DynSolValue::Address(settings.weth),
                DynSolValue::Address(settings.gmx.usdg),
            ],
        )
        .await?;
    tracing::info!(adapter = %adapter.address, reader = %reader.address, "Project contracts ready");

    let mut overrides = deployer.overrides();
    overrides.gas_limit = settings.call_gas_limit.or(overrides.gas_limit);

    tracing::info!("Initializing factory");
    deployer
        .send(
            &factory,
            IProxyFactory::initializeCall {
                weth: settings.weth,
                liquidityPool: settings.liquidity_pool,
            },
            overrides,
        )
        .await?;

    tracing::info!(project_id = %plan.project_id, "Setting project implementation");
    deployer
        .send(
            &factory,
            IProxyFactory::upgradeToCall {
                projectId: plan.project_id,
                implementation: adapter.address,
            },
            overrides,
        )
        .await?;

    tracing::info!("Setting project config");
    deployer
        .send(&factory, plan.project.call(plan.project_id)?, overrides)
        .await?;

    for (symbol, address, config) in &plan.assets {
        tracing::info!(asset = %symbol, address = %address, "Setting asset config");
        deployer
            .send(&factory, config.call(plan.project_id, *address), overrides)
            .await?;
    }

    for (symbol, address, borrow) in &plan.borrows {
        tracing::info!(
            asset = %symbol,
            asset_id = borrow.asset_id,
            cap = %borrow.borrow_cap,
            "Setting borrow config"
        );
        deployer
            .send(&factory, borrow.call(plan.project_id, *address)?, overrides)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProjectSettings {
        ProjectSettings {
            liquidity_pool: Address::repeat_byte(0x42),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_plan() {
        let plan = settings().plan().expect("Failed to plan");

        assert_eq!(plan.project_id, U256::from(PROJECT_GMX));
        assert_eq!(plan.assets.len(), 7);
        assert_eq!(plan.borrows.len(), 7);

        assert_eq!(
            plan.assets.iter().map(|(symbol, ..)| symbol.as_str()).collect::<Vec<_>>(),
            ["USDC", "USDT", "DAI", "WETH", "WBTC", "UNI", "LINK"]
        );
        assert_eq!(
            plan.borrows.iter().map(|(symbol, ..)| symbol.as_str()).collect::<Vec<_>>(),
            ["USDC", "USDT", "WETH", "WBTC", "DAI", "UNI", "LINK"]
        );

        let (_, _, wbtc) = &plan.borrows[3];
        assert_eq!(wbtc.asset_id, 4);
        assert_eq!(wbtc.borrow_cap, U256::from(400_000_000u64));
    }

    #[test]
    fn test_plan_requires_liquidity_pool() {
        let result = ProjectSettings::default().plan();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_plan_rejects_capped_sentinel() {
        let mut settings = settings();
        settings.assets[5].borrow.cap = "10".to_string();

        let err = settings.plan().unwrap_err();
        assert!(err.to_string().contains("UNI"), "unexpected error: {err}");
    }

    #[test]
    fn test_plan_rejects_duplicate_slots() {
        let mut settings = settings();
        settings.assets[1].borrow.asset_id = 0;
        assert!(matches!(settings.plan(), Err(Error::InvalidConfig(_))));

        // The sentinel may be shared.
        let mut settings = self::settings();
        settings.assets[0].borrow = BorrowSettings {
            asset_id: NO_BORROW_SLOT,
            cap: "0".to_string(),
            decimals: 6,
        };
        assert!(settings.plan().is_ok());
    }

    #[test]
    fn test_plan_rejects_long_referral_code() {
        let mut settings = settings();
        settings.referral_code = "r".repeat(40);
        assert!(settings.plan().is_err());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: ProjectSettings = toml::from_str(
            r#"
            liquidity_pool = "0x4242424242424242424242424242424242424242"
            proxy_admin = "0x1111111111111111111111111111111111111111"

            [[assets]]
            symbol = "USDC"
            address = "0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8"

            [assets.rates]
            boost_fee_rate = "0.02"
            initial_margin_rate = "0.006"
            maintenance_margin_rate = "0.005"
            liquidation_fee_rate = "0"
            reference_deviation = "0.001"

            [assets.borrow]
            asset_id = 0
            cap = "100000"
            decimals = 6
            "#,
        )
        .expect("Failed to parse settings");

        assert_eq!(settings.assets.len(), 1);
        assert_eq!(settings.project_id, PROJECT_GMX);
        assert_eq!(settings.gmx, GmxSettings::default());
        assert!(settings.proxy_admin.is_some());
        assert!(settings.plan().is_ok());
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("deploy".parse::<Phase>().unwrap(), Phase::Deploy);
        assert_eq!("init".parse::<Phase>().unwrap(), Phase::Init);
        assert_eq!(Phase::All.to_string(), "all");
    }
}
