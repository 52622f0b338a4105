//! Grid trading.
//!
//! Prices are bucketed into levels `floor((price - base) / step)`. Each
//! level fires at most once for the strategy's lifetime: the level is
//! recorded as triggered before the trade is submitted, so a failed or
//! repeated visit to the same level never trades twice.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ExecutionOutcome, StrategyContext};
use crate::types::SentinelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridParams {
    /// Asset being traded.
    pub token_a: Address,
    /// Counter-asset the price is quoted in.
    pub token_b: Address,
    pub base_price: U256,
    pub price_step: U256,
    /// Number of levels shown on each side of the base price.
    pub grid_size: u32,
    pub trade_amount: U256,
}

/// One rung of the grid ladder, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridLevel {
    pub index: i64,
    pub price: U256,
    pub triggered: bool,
}

#[derive(Debug, Clone)]
pub struct GridStrategy {
    id: u64,
    active: bool,
    params: GridParams,
    triggered: BTreeSet<i64>,
}

impl GridStrategy {
    pub fn new(id: u64, params: GridParams) -> Result<Self, SentinelError> {
        if params.price_step.is_zero() {
            return Err(SentinelError::InvalidStrategy {
                strategy_id: id,
                message: "price_step must be positive".into(),
            });
        }
        if params.token_a == params.token_b {
            return Err(SentinelError::InvalidStrategy {
                strategy_id: id,
                message: "token_a and token_b must differ".into(),
            });
        }
        Ok(Self {
            id,
            active: true,
            params,
            triggered: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn triggered_levels(&self) -> &BTreeSet<i64> {
        &self.triggered
    }

    pub fn grid_level(&self, price: U256) -> i64 {
        grid_level(price, self.params.base_price, self.params.price_step)
    }

    /// Ladder of `2 * grid_size + 1` levels centred on the base price.
    /// Levels below zero price are omitted.
    pub fn levels(&self) -> Vec<GridLevel> {
        let size = i64::from(self.params.grid_size);
        (-size..=size)
            .filter_map(|index| {
                let offset = self.params.price_step.saturating_mul(U256::from(index.unsigned_abs()));
                let price = if index < 0 {
                    self.params.base_price.checked_sub(offset)?
                } else {
                    self.params.base_price.saturating_add(offset)
                };
                Some(GridLevel {
                    index,
                    price,
                    triggered: self.triggered.contains(&index),
                })
            })
            .collect()
    }

    pub async fn should_execute(&self, ctx: &StrategyContext) -> Result<bool> {
        if !self.active {
            return Ok(false);
        }
        let price = ctx.market.price(self.params.token_a, self.params.token_b).await?;
        let level = self.grid_level(price);
        debug!(strategy_id = self.id, %price, level, "Grid level");
        Ok(!self.triggered.contains(&level))
    }

    pub async fn execute(&mut self, ctx: &StrategyContext) -> Result<ExecutionOutcome> {
        // Re-read the price; the market may have moved since eligibility.
        let price = ctx.market.price(self.params.token_a, self.params.token_b).await?;
        let level = self.grid_level(price);
        self.triggered.insert(level);

        let (token_in, token_out) = if price > self.params.base_price {
            (self.params.token_a, self.params.token_b)
        } else {
            (self.params.token_b, self.params.token_a)
        };

        info!(
            strategy_id = self.id,
            %price,
            level,
            side = if token_in == self.params.token_a { "sell" } else { "buy" },
            "Executing grid level"
        );

        let tx_hash = ctx.swap(token_in, token_out, self.params.trade_amount).await?;

        Ok(ExecutionOutcome::Swapped {
            chain_id: ctx.chain_id,
            token_in,
            token_out,
            amount: self.params.trade_amount,
            tx_hash,
        })
    }

    pub(super) fn restore(&mut self, active: bool, triggered: impl IntoIterator<Item = i64>) {
        self.triggered.extend(triggered);
        self.active = self.active && active;
    }
}

/// `floor((price - base) / step)` over signed distances.
///
/// Saturates at the `i64` range; `step` must be non-zero.
pub fn grid_level(price: U256, base: U256, step: U256) -> i64 {
    if price >= base {
        let q = (price - base) / step;
        i64::try_from(q).unwrap_or(i64::MAX)
    } else {
        let distance = base - price;
        let mut q = distance / step;
        if !(distance % step).is_zero() {
            q = q.saturating_add(U256::from(1u8));
        }
        i64::try_from(q).map(|q| -q).unwrap_or(i64::MIN)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
