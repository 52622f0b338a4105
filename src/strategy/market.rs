//! Market data hooks used by the strategies.
//!
//! There is no price oracle yet. `StaticMarketData` serves fixed prices and
//! holdings from configuration and can be updated at runtime, which is
//! also how tests move the market.

use std::collections::HashMap;
use std::sync::RwLock;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::types::ChainId;

/// Price and holdings source for strategy decisions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Price of `base` denominated in `quote`.
    async fn price(&self, base: Address, quote: Address) -> Result<U256>;

    /// Holdings of each asset for `account`, valued in a common unit and
    /// returned in the order of `assets`.
    async fn holdings(&self, assets: &[Address], account: Address) -> Result<Vec<U256>>;

    /// Price of `asset` on one particular chain, for cross-chain
    /// comparison.
    async fn chain_price(&self, chain_id: ChainId, asset: Address) -> Result<U256>;
}

/// Fixed prices and holdings with per-key overrides.
#[derive(Debug)]
pub struct StaticMarketData {
    default_price: U256,
    default_holding: U256,
    prices: RwLock<HashMap<(Address, Address), U256>>,
    holdings: RwLock<HashMap<Address, U256>>,
    chain_prices: RwLock<HashMap<(ChainId, Address), U256>>,
}

impl StaticMarketData {
    pub fn new(default_price: U256, default_holding: U256) -> Self {
        Self {
            default_price,
            default_holding,
            prices: RwLock::new(HashMap::new()),
            holdings: RwLock::new(HashMap::new()),
            chain_prices: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_price(&self, base: Address, quote: Address, price: U256) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((base, quote), price);
    }

    pub fn set_chain_price(&self, chain_id: ChainId, asset: Address, price: U256) {
        self.chain_prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((chain_id, asset), price);
    }

    pub fn set_holding(&self, asset: Address, value: U256) {
        self.holdings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset, value);
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn price(&self, base: Address, quote: Address) -> Result<U256> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        Ok(prices.get(&(base, quote)).copied().unwrap_or(self.default_price))
    }

    async fn holdings(&self, assets: &[Address], _account: Address) -> Result<Vec<U256>> {
        let holdings = self.holdings.read().unwrap_or_else(|e| e.into_inner());
        Ok(assets
            .iter()
            .map(|a| holdings.get(a).copied().unwrap_or(self.default_holding))
            .collect())
    }

    async fn chain_price(&self, chain_id: ChainId, asset: Address) -> Result<U256> {
        let prices = self.chain_prices.read().unwrap_or_else(|e| e.into_inner());
        Ok(prices.get(&(chain_id, asset)).copied().unwrap_or(self.default_price))
    }
}
