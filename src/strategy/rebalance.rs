//! Threshold rebalancing.
//!
//! Keeps a basket of assets near target weights (basis points summing to
//! 10000). Becomes eligible when any asset's weight drifts from its target
//! by more than `threshold_bps` and `min_interval_secs` has passed since
//! the last rebalance.

use alloy_primitives::{Address, U256};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{elapsed_at_least, ExecutionOutcome, StrategyContext};
use crate::types::SentinelError;

const TOTAL_BPS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceParams {
    pub assets: Vec<Address>,
    pub target_bps: Vec<u64>,
    pub threshold_bps: u64,
    pub min_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegDirection {
    Buy,
    Sell,
}

/// Correction needed for one asset: move `amount` in `direction` to go
/// from `current` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceLeg {
    pub asset: Address,
    pub current: U256,
    pub target: U256,
    pub direction: LegDirection,
    pub amount: U256,
}

#[derive(Debug, Clone)]
pub struct RebalanceStrategy {
    id: u64,
    active: bool,
    params: RebalanceParams,
    last_rebalance: DateTime<Utc>,
}

impl RebalanceStrategy {
    pub fn new(id: u64, params: RebalanceParams, created_at: DateTime<Utc>) -> Result<Self, SentinelError> {
        let invalid = |message: String| SentinelError::InvalidStrategy {
            strategy_id: id,
            message,
        };
        if params.assets.is_empty() {
            return Err(invalid("at least one asset is required".into()));
        }
        if params.assets.len() != params.target_bps.len() {
            return Err(invalid(format!(
                "{} assets but {} targets",
                params.assets.len(),
                params.target_bps.len()
            )));
        }
        let sum: u64 = params.target_bps.iter().sum();
        if sum != TOTAL_BPS {
            return Err(invalid(format!("targets sum to {sum} bps, expected {TOTAL_BPS}")));
        }
        Ok(Self {
            id,
            active: true,
            params,
            last_rebalance: created_at,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &RebalanceParams {
        &self.params
    }

    pub fn last_rebalance(&self) -> DateTime<Utc> {
        self.last_rebalance
    }

    pub async fn should_execute(&self, ctx: &StrategyContext, now: DateTime<Utc>) -> Result<bool> {
        if !self.active || !elapsed_at_least(self.last_rebalance, now, self.params.min_interval_secs) {
            return Ok(false);
        }
        let holdings = ctx.market.holdings(&self.params.assets, ctx.account).await?;
        Ok(self.exceeds_threshold(&holdings)?)
    }

    /// True if any asset's weight deviates from target by more than the
    /// threshold. An empty portfolio never does.
    pub fn exceeds_threshold(&self, holdings: &[U256]) -> Result<bool, SentinelError> {
        self.check_holdings(holdings)?;
        let total = total_value(holdings);
        if total.is_zero() {
            return Ok(false);
        }
        Ok(holdings
            .iter()
            .zip(&self.params.target_bps)
            .any(|(balance, target)| {
                let alloc = balance.saturating_mul(U256::from(TOTAL_BPS)) / total;
                let target = U256::from(*target);
                let deviation = if alloc > target { alloc - target } else { target - alloc };
                debug!(strategy_id = self.id, %alloc, %target, "Allocation");
                deviation > U256::from(self.params.threshold_bps)
            }))
    }

    /// Legs needed to bring `holdings` to the target weights.
    pub fn compute_legs(&self, holdings: &[U256]) -> Result<Vec<RebalanceLeg>, SentinelError> {
        self.check_holdings(holdings)?;
        let total = total_value(holdings);
        Ok(self
            .params
            .assets
            .iter()
            .zip(&self.params.target_bps)
            .zip(holdings)
            .filter_map(|((asset, bps), current)| {
                let target = total.saturating_mul(U256::from(*bps)) / U256::from(TOTAL_BPS);
                let (direction, amount) = if target > *current {
                    (LegDirection::Buy, target - *current)
                } else {
                    (LegDirection::Sell, *current - target)
                };
                (!amount.is_zero()).then_some(RebalanceLeg {
                    asset: *asset,
                    current: *current,
                    target,
                    direction,
                    amount,
                })
            })
            .collect())
    }

    /// One holding per asset, or the weights are meaningless.
    fn check_holdings(&self, holdings: &[U256]) -> Result<(), SentinelError> {
        if holdings.len() != self.params.assets.len() {
            return Err(SentinelError::StrategyExecutionFailure {
                strategy_id: self.id,
                message: format!(
                    "market returned {} holdings for {} assets",
                    holdings.len(),
                    self.params.assets.len()
                ),
            });
        }
        Ok(())
    }

    /// Computes the corrective legs and records the rebalance time. Routing
    /// the legs is left to the caller.
    pub async fn execute(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Result<ExecutionOutcome> {
        let holdings = ctx.market.holdings(&self.params.assets, ctx.account).await?;
        let legs = self.compute_legs(&holdings)?;

        for leg in &legs {
            info!(
                strategy_id = self.id,
                asset = %leg.asset,
                current = %leg.current,
                target = %leg.target,
                direction = ?leg.direction,
                amount = %leg.amount,
                "Rebalance leg"
            );
        }

        self.last_rebalance = now;
        Ok(ExecutionOutcome::Rebalanced { legs })
    }

    pub(super) fn restore(&mut self, active: bool, last_rebalance: DateTime<Utc>) {
        self.last_rebalance = last_rebalance;
        self.active = self.active && active;
    }
}

fn total_value(holdings: &[U256]) -> U256 {
    holdings.iter().fold(U256::ZERO, |acc, b| acc.saturating_add(*b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::quote::MockSwapQuoter;
    use crate::execution::MockTxSubmitter;
    use crate::strategy::market::{MockMarketData, StaticMarketData};
    use crate::strategy::test_context_with_market;
    use crate::types::NATIVE_ASSET;
    use alloy_primitives::address;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    const USDC: Address = address!("74b7f16337b8972027f6196a17a631ac6de26d22");

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn strategy() -> RebalanceStrategy {
        RebalanceStrategy::new(
            3,
            RebalanceParams {
                assets: vec![NATIVE_ASSET, USDC],
                target_bps: vec![6000, 4000],
                threshold_bps: 500,
                min_interval_secs: 86_400,
            },
            t0(),
        )
        .unwrap()
    }

    fn units(values: &[u64]) -> Vec<U256> {
        values.iter().map(|v| U256::from(*v)).collect()
    }

    #[test]
    fn test_threshold() {
        let s = strategy();
        assert!(s.exceeds_threshold(&units(&[7000, 3000])).unwrap());
        assert!(!s.exceeds_threshold(&units(&[6400, 3600])).unwrap());
        // Exactly at the threshold is not enough.
        assert!(!s.exceeds_threshold(&units(&[6500, 3500])).unwrap());
    }

    #[test]
    fn test_empty_portfolio_never_eligible() {
        assert!(!strategy().exceeds_threshold(&units(&[0, 0])).unwrap());
    }

    #[test]
    fn test_targets_must_sum_to_10000() {
        let err = RebalanceStrategy::new(
            3,
            RebalanceParams {
                assets: vec![NATIVE_ASSET, USDC],
                target_bps: vec![6000, 3000],
                threshold_bps: 500,
                min_interval_secs: 0,
            },
            t0(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("9000"));
    }

    #[test]
    fn test_legs() {
        let legs = strategy().compute_legs(&units(&[7000, 3000])).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].direction, LegDirection::Sell);
        assert_eq!(legs[0].amount, U256::from(1000));
        assert_eq!(legs[1].direction, LegDirection::Buy);
        assert_eq!(legs[1].target, U256::from(4000));

        assert!(strategy().compute_legs(&units(&[6000, 4000])).unwrap().is_empty());
    }

    #[test]
    fn test_holdings_length_must_match_assets() {
        let s = strategy();
        assert!(s.exceeds_threshold(&units(&[7000])).is_err());
        assert!(s.exceeds_threshold(&units(&[7000, 3000, 5000])).is_err());
        let err = s.compute_legs(&units(&[7000, 3000, 5000])).unwrap_err();
        assert!(err.to_string().contains("3 holdings for 2 assets"));
    }

    #[tokio::test]
    async fn test_short_holdings_fail_without_rebalancing() {
        let mut market = MockMarketData::new();
        market
            .expect_holdings()
            .returning(|_, _| Ok(vec![U256::from(7000)]));
        let ctx = StrategyContext {
            market: Arc::new(market),
            ..test_context_with_market(
                MockSwapQuoter::new(),
                MockTxSubmitter::new(),
                Arc::new(StaticMarketData::new(U256::ZERO, U256::ZERO)),
            )
        };

        let mut s = strategy();
        let now = t0() + Duration::days(2);
        assert!(s.should_execute(&ctx, now).await.is_err());
        assert!(s.execute(&ctx, now).await.is_err());
        assert_eq!(s.last_rebalance(), t0());
    }

    #[tokio::test]
    async fn test_interval_and_execute() {
        let market = Arc::new(StaticMarketData::new(U256::ZERO, U256::ZERO));
        market.set_holding(NATIVE_ASSET, U256::from(7000));
        market.set_holding(USDC, U256::from(3000));
        // Rebalancing never touches the quoter or submitter.
        let ctx = test_context_with_market(MockSwapQuoter::new(), MockTxSubmitter::new(), market);

        let mut s = strategy();
        assert!(!s.should_execute(&ctx, t0() + Duration::hours(23)).await.unwrap());

        let now = t0() + Duration::hours(24);
        assert!(s.should_execute(&ctx, now).await.unwrap());

        let outcome = s.execute(&ctx, now).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Rebalanced { ref legs } if legs.len() == 2));
        assert_eq!(s.last_rebalance(), now);
        assert!(!s.should_execute(&ctx, now).await.unwrap());
    }
}
