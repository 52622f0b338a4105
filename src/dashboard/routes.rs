//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>` and
//! replaced by the agent after every tick, so handlers always serve the
//! last-known-good view together with its age.

use alloy_primitives::{Address, U256};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{GasQuote, PortfolioSnapshot};
use crate::strategy::StrategySnapshot;
use crate::types::{ArbitrageOpportunity, ChainDescriptor, ChainId, ChainWarning};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Tick-level counters.
#[derive(Debug, Clone, Default)]
pub struct TickStatus {
    pub tick_count: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub best_chain: Option<ChainId>,
    pub warnings: Vec<ChainWarning>,
    pub strategy_failures: usize,
}

/// Everything the agent publishes after a tick.
#[derive(Debug, Clone, Default)]
pub struct DashboardUpdate {
    pub status: TickStatus,
    pub portfolio: PortfolioSnapshot,
    pub strategies: Vec<StrategySnapshot>,
    pub gas_quotes: Vec<GasQuote>,
    pub opportunities: Vec<ArbitrageOpportunity>,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub started_at: DateTime<Utc>,
    pub chains: RwLock<Vec<ChainDescriptor>>,
    pub status: RwLock<TickStatus>,
    pub portfolio: RwLock<PortfolioSnapshot>,
    pub strategies: RwLock<Vec<StrategySnapshot>>,
    pub gas_quotes: RwLock<Vec<GasQuote>>,
    pub opportunities: RwLock<Vec<ArbitrageOpportunity>>,
}

impl DashboardState {
    pub fn new(chains: Vec<ChainDescriptor>) -> Self {
        Self {
            started_at: Utc::now(),
            chains: RwLock::new(chains),
            status: RwLock::new(TickStatus::default()),
            portfolio: RwLock::new(PortfolioSnapshot::default()),
            strategies: RwLock::new(Vec::new()),
            gas_quotes: RwLock::new(Vec::new()),
            opportunities: RwLock::new(Vec::new()),
        }
    }

    /// Replace the published view with the result of a tick.
    pub async fn publish(&self, update: DashboardUpdate) {
        *self.status.write().await = update.status;
        *self.portfolio.write().await = update.portfolio;
        *self.strategies.write().await = update.strategies;
        *self.gas_quotes.write().await = update.gas_quotes;
        *self.opportunities.write().await = update.opportunities;
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub tick_count: u64,
    pub last_tick: Option<DateTime<Utc>>,
    /// Seconds since the last refresh with at least one fresh chain.
    pub snapshot_age_secs: Option<i64>,
    pub best_chain: Option<ChainId>,
    pub chains_registered: usize,
    pub strategies_active: usize,
    pub strategy_failures: usize,
    pub warnings: Vec<ChainWarning>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainBalances {
    pub chain_id: ChainId,
    pub balances: BTreeMap<Address, U256>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioResponse {
    pub address: Address,
    pub total_value: U256,
    pub last_refresh: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub chains: Vec<ChainBalances>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainResponse {
    pub chain_id: ChainId,
    pub name: String,
    pub is_testnet: bool,
    pub block_time_secs: u64,
    pub gas_price: Option<U256>,
    pub estimated_swap_cost: Option<U256>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let status = state.status.read().await;
    let portfolio = state.portfolio.read().await;
    let strategies = state.strategies.read().await;

    Json(StatusResponse {
        tick_count: status.tick_count,
        last_tick: status.last_tick,
        snapshot_age_secs: portfolio.age(now).map(|d| d.num_seconds()),
        best_chain: status.best_chain,
        chains_registered: state.chains.read().await.len(),
        strategies_active: strategies.iter().filter(|s| s.active).count(),
        strategy_failures: status.strategy_failures,
        warnings: status.warnings.clone(),
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}

/// GET /api/portfolio
pub async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioResponse> {
    let now = Utc::now();
    let portfolio = state.portfolio.read().await;

    let chains = portfolio
        .chains
        .iter()
        .map(|(chain_id, holdings)| ChainBalances {
            chain_id: *chain_id,
            balances: holdings.balances.clone(),
            refreshed_at: holdings.refreshed_at,
            age_secs: portfolio.chain_age(*chain_id, now).map(|d| d.num_seconds()),
        })
        .collect();

    Json(PortfolioResponse {
        address: portfolio.address,
        total_value: portfolio.total_value,
        last_refresh: portfolio.last_refresh,
        age_secs: portfolio.age(now).map(|d| d.num_seconds()),
        chains,
    })
}

/// GET /api/strategies
pub async fn get_strategies(State(state): State<AppState>) -> Json<Vec<StrategySnapshot>> {
    Json(state.strategies.read().await.clone())
}

/// GET /api/chains
pub async fn get_chains(State(state): State<AppState>) -> Json<Vec<ChainResponse>> {
    let chains = state.chains.read().await;
    let quotes = state.gas_quotes.read().await;

    Json(
        chains
            .iter()
            .map(|c| {
                let quote = quotes.iter().find(|q| q.chain_id == c.chain_id);
                ChainResponse {
                    chain_id: c.chain_id,
                    name: c.name.clone(),
                    is_testnet: c.is_testnet,
                    block_time_secs: c.block_time_secs,
                    gas_price: quote.map(|q| q.gas_price),
                    estimated_swap_cost: quote.map(|q| q.estimated_cost),
                }
            })
            .collect(),
    )
}

/// GET /api/opportunities
pub async fn get_opportunities(State(state): State<AppState>) -> Json<Vec<ArbitrageOpportunity>> {
    Json(state.opportunities.read().await.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
