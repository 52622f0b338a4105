//! Agent loop: one periodic tick drives every component.
//!
//! Tick order: portfolio refresh, strategies, gas arbitration, arbitrage
//! scan. Steps run one after another; each is isolated so a failure is
//! logged and the tick carries on. With strategies and multichain both
//! switched off the tick makes a single fixed swap instead. After the tick
//! the result is published to the dashboard and strategy state is persisted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::chain::ChainRegistry;
use crate::dashboard::{AppState, DashboardUpdate, TickStatus};
use crate::engine::{ArbitrageScanner, FanOut, GasArbiter, GasQuote, PortfolioTracker};
use crate::execution::TxHash;
use crate::storage::{self, PersistedState};
use crate::strategy::{StrategyContext, StrategyEngine, StrategyTickReport};
use crate::types::{ArbitrageOpportunity, ChainId, ChainWarning, TxCategory, NATIVE_ASSET};

/// Default basic-swap output token (USDC on X Layer).
pub const DEFAULT_SWAP_TOKEN_OUT: Address = address!("74b7f16337b8972027f6196a17a631ac6de26d22");
/// Default basic-swap input: 0.1 of the native asset.
pub const DEFAULT_SWAP_AMOUNT: u64 = 100_000_000_000_000_000;

/// The swap made once per tick when no other step is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicSwap {
    pub token_in: Address,
    pub token_out: Address,
    pub amount: U256,
}

impl Default for BasicSwap {
    fn default() -> Self {
        Self {
            token_in: NATIVE_ASSET,
            token_out: DEFAULT_SWAP_TOKEN_OUT,
            amount: U256::from(DEFAULT_SWAP_AMOUNT),
        }
    }
}

/// Feature switches and loop settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Address whose native balances are tracked.
    pub portfolio_address: Address,
    pub enable_strategies: bool,
    /// Gates portfolio refresh, gas arbitration and arbitrage.
    pub enable_multichain: bool,
    /// `Some(min_profit_pct)` enables the arbitrage scan.
    pub arbitrage_min_profit_pct: Option<u64>,
    pub tick_interval: Duration,
    /// Where strategy state is persisted; `None` disables persistence.
    pub state_file: Option<String>,
    /// Made when both `enable_strategies` and `enable_multichain` are off.
    pub basic_swap: BasicSwap,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub warnings: Vec<ChainWarning>,
    pub strategies: StrategyTickReport,
    pub gas_quotes: Vec<GasQuote>,
    pub best_chain: Option<ChainId>,
    pub opportunities: Vec<ArbitrageOpportunity>,
    /// Hash of the basic swap, if one was submitted.
    pub basic_swap: Option<TxHash>,
}

pub struct Agent {
    registry: Arc<ChainRegistry>,
    tracker: PortfolioTracker,
    gas: GasArbiter,
    scanner: Option<ArbitrageScanner>,
    engine: StrategyEngine,
    ctx: StrategyContext,
    settings: AgentSettings,
    dashboard: Option<AppState>,
    tick_count: u64,
}

impl Agent {
    pub fn new(
        registry: Arc<ChainRegistry>,
        fanout: FanOut,
        engine: StrategyEngine,
        ctx: StrategyContext,
        settings: AgentSettings,
    ) -> Self {
        let scanner = settings
            .arbitrage_min_profit_pct
            .map(|pct| ArbitrageScanner::with_threshold(Arc::clone(&registry), pct));
        Self {
            tracker: PortfolioTracker::new(Arc::clone(&registry), fanout),
            gas: GasArbiter::new(Arc::clone(&registry), fanout),
            registry,
            scanner,
            engine,
            ctx,
            settings,
            dashboard: None,
            tick_count: 0,
        }
    }

    /// Publish every tick's result to the dashboard.
    pub fn with_dashboard(mut self, dashboard: AppState) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tracker(&self) -> &PortfolioTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    /// Restore strategy state and the tick counter from a saved file.
    pub fn restore(&mut self, state: PersistedState) {
        self.tick_count = state.tick_count;
        let restored = self.engine.restore_states(state.strategies);
        info!(
            restored,
            tick_count = self.tick_count,
            saved_at = %state.saved_at,
            "Resumed from saved state"
        );
    }

    pub fn persisted_state(&self, now: DateTime<Utc>) -> PersistedState {
        PersistedState {
            saved_at: now,
            tick_count: self.tick_count,
            strategies: self.engine.states(),
        }
    }

    /// Run one tick at `now`.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..Default::default()
        };
        info!(tick = self.tick_count, "Starting tick");

        if self.settings.enable_multichain {
            let (_, warnings) = self.tracker.refresh(self.settings.portfolio_address).await;
            report.warnings = warnings;
        }

        if self.settings.enable_strategies {
            report.strategies = self.engine.tick(&self.ctx, now).await;
        }

        if !self.settings.enable_strategies && !self.settings.enable_multichain {
            report.basic_swap = self.basic_swap().await;
        }

        if self.settings.enable_multichain {
            report.gas_quotes = self.gas.quotes(TxCategory::Swap).await;
            match GasArbiter::best_of(&report.gas_quotes) {
                Ok(best) => {
                    info!(chain = %best.chain_name, chain_id = best.chain_id, "Best chain for swaps");
                    report.best_chain = Some(best.chain_id);
                }
                Err(e) => warn!(error = %e, "Failed to find best chain"),
            }

            if self.scanner.is_some() {
                match self.scan_arbitrage().await {
                    Ok(opps) => report.opportunities = opps,
                    Err(e) => warn!(error = %e, "Arbitrage scan failed"),
                }
            }
        }

        info!(
            tick = report.tick,
            executed = report.strategies.executed.len(),
            strategy_failures = report.strategies.failures.len(),
            chain_warnings = report.warnings.len(),
            opportunities = report.opportunities.len(),
            "Tick complete"
        );

        self.publish(&report, now).await;
        report
    }

    async fn basic_swap(&self) -> Option<TxHash> {
        let swap = self.settings.basic_swap;
        match self.ctx.swap(swap.token_in, swap.token_out, swap.amount).await {
            Ok(hash) => {
                info!(chain_id = self.ctx.chain_id, tx_hash = %hash, "Basic swap submitted");
                Some(hash)
            }
            Err(e) => {
                warn!(chain_id = self.ctx.chain_id, error = %e, "Basic swap failed");
                None
            }
        }
    }

    /// Prices are fetched up front since the scanner's price lookup is
    /// synchronous.
    async fn scan_arbitrage(&self) -> Result<Vec<ArbitrageOpportunity>> {
        let Some(scanner) = &self.scanner else {
            return Ok(Vec::new());
        };

        let chains = self.registry.all();
        let mut prices: HashMap<(ChainId, Address), U256> = HashMap::new();
        for chain in &chains {
            for asset in chains.iter().map(|c| c.native_asset) {
                if prices.contains_key(&(chain.chain_id, asset)) {
                    continue;
                }
                match self.ctx.market.chain_price(chain.chain_id, asset).await {
                    Ok(p) => {
                        prices.insert((chain.chain_id, asset), p);
                    }
                    Err(e) => warn!(chain_id = chain.chain_id, error = %e, "Chain price unavailable"),
                }
            }
        }

        let ids: Vec<ChainId> = chains.iter().map(|c| c.chain_id).collect();
        scanner.scan(&ids, |chain_id, asset| {
            prices
                .get(&(chain_id, asset))
                .copied()
                .ok_or_else(|| anyhow!("no price for chain {chain_id}"))
        })
    }

    async fn publish(&self, report: &TickReport, now: DateTime<Utc>) {
        let Some(dashboard) = &self.dashboard else {
            return;
        };
        dashboard
            .publish(DashboardUpdate {
                status: TickStatus {
                    tick_count: self.tick_count,
                    last_tick: Some(now),
                    best_chain: report.best_chain,
                    warnings: report.warnings.clone(),
                    strategy_failures: report.strategies.failures.len(),
                },
                portfolio: self.tracker.snapshot().clone(),
                strategies: self.engine.snapshots(),
                gas_quotes: report.gas_quotes.clone(),
                opportunities: report.opportunities.clone(),
            })
            .await;
    }

    fn save_state(&self) {
        let Some(path) = self.settings.state_file.as_deref() else {
            return;
        };
        if let Err(e) = storage::save_state(&self.persisted_state(Utc::now()), Some(path)) {
            error!(error = %e, "Failed to save state");
        }
    }

    /// Tick on the configured interval until `shutdown` resolves. The
    /// first tick fires immediately.
    ///
    /// A shutdown during a tick abandons it: in-flight chain queries are
    /// dropped and nothing they would have returned is merged. Strategy
    /// state is saved either way.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.settings.tick_interval.as_secs(),
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }

            let finished = tokio::select! {
                _ = self.run_tick(Utc::now()) => true,
                _ = &mut shutdown => false,
            };
            if !finished {
                info!(tick = self.tick_count, "Shutdown signal received mid-tick; abandoning it.");
                break;
            }
            self.save_state();
        }

        self.save_state();
        info!(ticks = self.tick_count, "SENTINEL shut down cleanly.");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
