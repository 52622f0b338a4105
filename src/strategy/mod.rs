//! Strategy engine: DCA, grid and threshold-rebalance state machines.
//!
//! Strategies are a closed set of variants dispatched through `Strategy`.
//! `StrategyEngine::tick` evaluates every strategy once per tick in
//! insertion order; a failure in one strategy is logged and recorded in
//! the tick report but never stops the others.

pub mod dca;
pub mod grid;
pub mod market;
pub mod rebalance;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::execution::{SubmitRequest, SwapQuoter, TxHash, TxSubmitter};
use crate::types::{ChainId, SentinelError};
use dca::DcaStrategy;
use grid::{GridLevel, GridStrategy};
use market::MarketData;
use rebalance::{RebalanceLeg, RebalanceStrategy};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Collaborators a strategy acts through during one tick.
#[derive(Clone)]
pub struct StrategyContext {
    /// Chain swaps are submitted on.
    pub chain_id: ChainId,
    /// Smart account that holds funds and performs swaps.
    pub account: Address,
    pub quoter: Arc<dyn SwapQuoter>,
    pub submitter: Arc<dyn TxSubmitter>,
    pub market: Arc<dyn MarketData>,
}

impl StrategyContext {
    /// Quote a swap and submit it through the smart account.
    pub async fn swap(&self, token_in: Address, token_out: Address, amount: U256) -> Result<TxHash> {
        let quote = self
            .quoter
            .quote(self.chain_id, token_in, token_out, amount)
            .await
            .context("Failed to get swap quote")?;
        if quote.fallback {
            warn!(chain_id = self.chain_id, "Submitting against placeholder quote");
        }

        self.submitter
            .submit(SubmitRequest {
                chain_id: self.chain_id,
                account: self.account,
                target: quote.target,
                call_data: quote.call_data,
            })
            .await
            .context("Failed to submit swap")
    }
}

/// Whole seconds from `since` to `now` are at least `secs`.
fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, secs: u64) -> bool {
    (now - since).num_seconds() >= i64::try_from(secs).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Dca,
    Grid,
    Rebalance,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Dca => write!(f, "DCA"),
            StrategyKind::Grid => write!(f, "Grid"),
            StrategyKind::Rebalance => write!(f, "Rebalance"),
        }
    }
}

/// What a successful execution did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Swapped {
        chain_id: ChainId,
        token_in: Address,
        token_out: Address,
        amount: U256,
        tx_hash: TxHash,
    },
    Rebalanced { legs: Vec<RebalanceLeg> },
}

/// Persistable execution state of one strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyState {
    Dca {
        active: bool,
        executions_done: u32,
        last_execution: DateTime<Utc>,
    },
    Grid {
        active: bool,
        triggered_levels: Vec<i64>,
    },
    Rebalance {
        active: bool,
        last_rebalance: DateTime<Utc>,
    },
}

impl StrategyState {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyState::Dca { .. } => StrategyKind::Dca,
            StrategyState::Grid { .. } => StrategyKind::Grid,
            StrategyState::Rebalance { .. } => StrategyKind::Rebalance,
        }
    }
}

/// Read-only view for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySnapshot {
    pub id: u64,
    pub kind: StrategyKind,
    pub active: bool,
    pub state: StrategyState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grid_levels: Vec<GridLevel>,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Dca(DcaStrategy),
    Grid(GridStrategy),
    Rebalance(RebalanceStrategy),
}

impl Strategy {
    pub fn id(&self) -> u64 {
        match self {
            Strategy::Dca(s) => s.id(),
            Strategy::Grid(s) => s.id(),
            Strategy::Rebalance(s) => s.id(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Dca(_) => StrategyKind::Dca,
            Strategy::Grid(_) => StrategyKind::Grid,
            Strategy::Rebalance(_) => StrategyKind::Rebalance,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Strategy::Dca(s) => s.is_active(),
            Strategy::Grid(s) => s.is_active(),
            Strategy::Rebalance(s) => s.is_active(),
        }
    }

    /// Eligibility check. Reads market data but never mutates the strategy.
    pub async fn should_execute(&self, ctx: &StrategyContext, now: DateTime<Utc>) -> Result<bool> {
        match self {
            Strategy::Dca(s) => Ok(s.should_execute(now)),
            Strategy::Grid(s) => s.should_execute(ctx).await,
            Strategy::Rebalance(s) => s.should_execute(ctx, now).await,
        }
    }

    /// Execute once. Errors come back as `StrategyExecutionFailure`.
    pub async fn execute(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Result<ExecutionOutcome> {
        let strategy_id = self.id();
        if !self.is_active() {
            return Err(SentinelError::StrategyExecutionFailure {
                strategy_id,
                message: "strategy is inactive".into(),
            }
            .into());
        }

        let result = match self {
            Strategy::Dca(s) => s.execute(ctx, now).await,
            Strategy::Grid(s) => s.execute(ctx).await,
            Strategy::Rebalance(s) => s.execute(ctx, now).await,
        };
        result.map_err(|e| {
            SentinelError::StrategyExecutionFailure {
                strategy_id,
                message: format!("{e:#}"),
            }
            .into()
        })
    }

    pub fn state(&self) -> StrategyState {
        match self {
            Strategy::Dca(s) => StrategyState::Dca {
                active: s.is_active(),
                executions_done: s.executions_done(),
                last_execution: s.last_execution(),
            },
            Strategy::Grid(s) => StrategyState::Grid {
                active: s.is_active(),
                triggered_levels: s.triggered_levels().iter().copied().collect(),
            },
            Strategy::Rebalance(s) => StrategyState::Rebalance {
                active: s.is_active(),
                last_rebalance: s.last_rebalance(),
            },
        }
    }

    /// Apply persisted state. A restored state can deactivate a strategy but
    /// never reactivate it.
    pub fn restore(&mut self, state: StrategyState) -> Result<(), SentinelError> {
        match (self, state) {
            (
                Strategy::Dca(s),
                StrategyState::Dca {
                    active,
                    executions_done,
                    last_execution,
                },
            ) => s.restore(active, executions_done, last_execution),
            (
                Strategy::Grid(s),
                StrategyState::Grid {
                    active,
                    triggered_levels,
                },
            ) => s.restore(active, triggered_levels),
            (
                Strategy::Rebalance(s),
                StrategyState::Rebalance {
                    active,
                    last_rebalance,
                },
            ) => s.restore(active, last_rebalance),
            (s, state) => {
                return Err(SentinelError::InvalidStrategy {
                    strategy_id: s.id(),
                    message: format!("cannot restore {} state into {} strategy", state.kind(), s.kind()),
                })
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            id: self.id(),
            kind: self.kind(),
            active: self.is_active(),
            state: self.state(),
            grid_levels: match self {
                Strategy::Grid(s) => s.levels(),
                _ => Vec::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Eligibility,
    Execution,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyFailure {
    pub strategy_id: u64,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedStrategy {
    pub strategy_id: u64,
    pub kind: StrategyKind,
    pub outcome: ExecutionOutcome,
}

/// Everything that happened to the strategies in one tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyTickReport {
    pub evaluated: usize,
    pub executed: Vec<ExecutedStrategy>,
    pub failures: Vec<StrategyFailure>,
}

/// Owns the strategies and drives them once per tick.
///
/// `tick` takes `&mut self`, so no strategy ever executes concurrently with
/// itself.
#[derive(Debug, Default)]
pub struct StrategyEngine {
    strategies: Vec<Strategy>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy. Ids must be unique.
    pub fn add(&mut self, strategy: Strategy) -> Result<(), SentinelError> {
        let id = strategy.id();
        if self.strategies.iter().any(|s| s.id() == id) {
            return Err(SentinelError::InvalidStrategy {
                strategy_id: id,
                message: "duplicate strategy id".into(),
            });
        }
        info!(strategy_id = id, kind = %strategy.kind(), "Strategy added");
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn get(&self, id: u64) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.strategies.iter().filter(|s| s.is_active()).count()
    }

    pub fn snapshots(&self) -> Vec<StrategySnapshot> {
        self.strategies.iter().map(Strategy::snapshot).collect()
    }

    pub fn states(&self) -> BTreeMap<u64, StrategyState> {
        self.strategies.iter().map(|s| (s.id(), s.state())).collect()
    }

    /// Restore persisted states by id. States for unknown ids and states
    /// that don't match their strategy's kind are skipped with a warning.
    /// Returns the number of strategies restored.
    pub fn restore_states(&mut self, states: BTreeMap<u64, StrategyState>) -> usize {
        let mut restored = 0;
        for (id, state) in states {
            match self.strategies.iter_mut().find(|s| s.id() == id) {
                Some(strategy) => match strategy.restore(state) {
                    Ok(()) => restored += 1,
                    Err(e) => warn!(strategy_id = id, error = %e, "Skipping persisted state"),
                },
                None => warn!(strategy_id = id, "Persisted state for unknown strategy"),
            }
        }
        restored
    }

    /// Evaluate every strategy once, in insertion order.
    pub async fn tick(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> StrategyTickReport {
        let mut report = StrategyTickReport::default();

        for strategy in &mut self.strategies {
            report.evaluated += 1;
            let strategy_id = strategy.id();
            let kind = strategy.kind();

            match strategy.should_execute(ctx, now).await {
                Ok(false) => {
                    debug!(strategy_id, kind = %kind, "Not eligible");
                    continue;
                }
                Ok(true) => {}
                Err(e) => {
                    warn!(strategy_id, kind = %kind, error = %e, "Eligibility check failed");
                    report.failures.push(StrategyFailure {
                        strategy_id,
                        stage: FailureStage::Eligibility,
                        message: format!("{e:#}"),
                    });
                    continue;
                }
            }

            match strategy.execute(ctx, now).await {
                Ok(outcome) => {
                    info!(strategy_id, kind = %kind, "Strategy executed");
                    report.executed.push(ExecutedStrategy {
                        strategy_id,
                        kind,
                        outcome,
                    });
                }
                Err(e) => {
                    warn!(strategy_id, kind = %kind, error = %e, "Strategy execution failed");
                    report.failures.push(StrategyFailure {
                        strategy_id,
                        stage: FailureStage::Execution,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) fn test_context(
    quoter: crate::execution::quote::MockSwapQuoter,
    submitter: crate::execution::MockTxSubmitter,
) -> StrategyContext {
    test_context_with_market(
        quoter,
        submitter,
        Arc::new(market::StaticMarketData::new(U256::from(2000), U256::ZERO)),
    )
}

#[cfg(test)]
pub(crate) fn test_context_with_market(
    quoter: crate::execution::quote::MockSwapQuoter,
    submitter: crate::execution::MockTxSubmitter,
    market: Arc<market::StaticMarketData>,
) -> StrategyContext {
    StrategyContext {
        chain_id: 196,
        account: Address::repeat_byte(0x5a),
        quoter: Arc::new(quoter),
        submitter: Arc::new(submitter),
        market,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
