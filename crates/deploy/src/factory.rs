//! Typed configuration payloads for the proxy factory.
//!
//! The factory takes its configuration as positional `uint256[]` arrays. Each payload type
//! here owns its field order and fixed-point precision, so call sites never build raw arrays.

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    codec::{right_pad_word, to_unit},
    error::{Error, Result},
};

alloy_core::sol! {
    /// Configuration surface of the proxy factory.
    interface IProxyFactory {
        function initialize(address weth, address liquidityPool) external;
        function upgradeTo(uint256 projectId, address implementation) external;
        function setProjectConfig(uint256 projectId, uint256[] values) external;
        function setProjectAssetConfig(uint256 projectId, address assetToken, uint256[] values) external;
        function setBorrowConfig(uint256 projectId, address assetToken, uint8 projectAssetId, uint256 limit) external;
    }
}

/// Precision of every rate in [`ProjectAssetConfig`].
pub const RATE_DECIMALS: u8 = 5;

/// Borrow slot id meaning "this asset cannot be borrowed".
pub const NO_BORROW_SLOT: u8 = 255;

/// Project-wide configuration: the external exchange contracts and order settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub vault: Address,
    pub position_router: Address,
    pub order_book: Address,
    pub router: Address,
    pub referral_code: B256,
    pub market_order_timeout_seconds: u64,
    pub limit_order_timeout_seconds: u64,
    pub funding_asset_id: u8,
}

impl ProjectConfig {
    /// Positional values: four right-padded addresses, the referral code, both timeouts and
    /// the funding asset id.
    pub fn encode(&self) -> Result<Vec<U256>> {
        let mut values = Vec::with_capacity(8);
        for address in [self.vault, self.position_router, self.order_book, self.router] {
            values.push(right_pad_word(&address.to_string())?);
        }
        values.push(U256::from_be_bytes(self.referral_code.0));
        values.push(U256::from(self.market_order_timeout_seconds));
        values.push(U256::from(self.limit_order_timeout_seconds));
        values.push(U256::from(self.funding_asset_id));
        Ok(values)
    }

    pub fn call(&self, project_id: U256) -> Result<IProxyFactory::setProjectConfigCall> {
        Ok(IProxyFactory::setProjectConfigCall {
            projectId: project_id,
            values: self.encode()?,
        })
    }
}

/// Human-readable rates of one asset, as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRates {
    pub boost_fee_rate: String,
    pub initial_margin_rate: String,
    pub maintenance_margin_rate: String,
    pub liquidation_fee_rate: String,
    #[serde(default)]
    pub reference_oracle: u64,
    pub reference_deviation: String,
}

/// Per-asset trading configuration, every rate scaled to [`RATE_DECIMALS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectAssetConfig {
    pub boost_fee_rate: U256,
    pub initial_margin_rate: U256,
    pub maintenance_margin_rate: U256,
    pub liquidation_fee_rate: U256,
    pub reference_oracle: U256,
    pub reference_deviation: U256,
}

impl ProjectAssetConfig {
    /// Scale `rates`. Fails on any rate that is negative or too precise.
    pub fn from_rates(rates: &AssetRates) -> Result<Self> {
        Ok(Self {
            boost_fee_rate: to_unit(&rates.boost_fee_rate, RATE_DECIMALS)?,
            initial_margin_rate: to_unit(&rates.initial_margin_rate, RATE_DECIMALS)?,
            maintenance_margin_rate: to_unit(&rates.maintenance_margin_rate, RATE_DECIMALS)?,
            liquidation_fee_rate: to_unit(&rates.liquidation_fee_rate, RATE_DECIMALS)?,
            reference_oracle: U256::from(rates.reference_oracle),
            reference_deviation: to_unit(&rates.reference_deviation, RATE_DECIMALS)?,
        })
    }

    pub fn encode(&self) -> Vec<U256> {
        vec![
            self.boost_fee_rate,
            self.initial_margin_rate,
            self.maintenance_margin_rate,
            self.liquidation_fee_rate,
            self.reference_oracle,
            self.reference_deviation,
        ]
    }

    pub fn call(&self, project_id: U256, asset: Address) -> IProxyFactory::setProjectAssetConfigCall {
        IProxyFactory::setProjectAssetConfigCall {
            projectId: project_id,
            assetToken: asset,
            values: self.encode(),
        }
    }
}

/// Borrow slot and cap of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowConfig {
    pub asset_id: u8,
    /// Cap in the asset's native decimals.
    pub borrow_cap: U256,
}

impl BorrowConfig {
    /// Scale a human-readable cap with the asset's `decimals`.
    pub fn new(asset_id: u8, borrow_cap: &str, decimals: u8) -> Result<Self> {
        let config = Self {
            asset_id,
            borrow_cap: to_unit(borrow_cap, decimals)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// An asset without a borrow slot must carry a zero cap.
    pub fn validate(&self) -> Result<()> {
        if self.asset_id == NO_BORROW_SLOT && !self.borrow_cap.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "asset id {NO_BORROW_SLOT} has no borrow slot but a cap of {} was given",
                self.borrow_cap
            )));
        }
        Ok(())
    }

    pub fn call(
        &self,
        project_id: U256,
        asset: Address,
    ) -> Result<IProxyFactory::setBorrowConfigCall> {
        self.validate()?;
        Ok(IProxyFactory::setBorrowConfigCall {
            projectId: project_id,
            assetToken: asset,
            projectAssetId: self.asset_id,
            limit: self.borrow_cap,
        })
    }
}
