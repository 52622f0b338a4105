//! Multi-tick scenarios driving the agent end to end against mock chains.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use sentinel::agent::{Agent, AgentSettings, BasicSwap};
use sentinel::chain::ChainRegistry;
use sentinel::engine::FanOut;
use sentinel::storage;
use sentinel::strategy::dca::{DcaParams, DcaStrategy};
use sentinel::strategy::grid::{GridParams, GridStrategy};
use sentinel::strategy::market::StaticMarketData;
use sentinel::strategy::rebalance::{LegDirection, RebalanceParams, RebalanceStrategy};
use sentinel::strategy::{ExecutionOutcome, Strategy, StrategyContext, StrategyEngine, StrategyState};
use sentinel::types::NATIVE_ASSET;

use crate::support::{three_chain_registry, FixedQuoter, RecordingSubmitter};

const USDC: Address = address!("74b7f16337b8972027f6196a17a631ac6de26d22");
const ACCOUNT: Address = address!("5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a");

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

struct Harness {
    agent: Agent,
    market: Arc<StaticMarketData>,
    submitter: Arc<RecordingSubmitter>,
}

fn harness(registry: Arc<ChainRegistry>, engine: StrategyEngine, settings: AgentSettings) -> Harness {
    let market = Arc::new(StaticMarketData::new(U256::from(2000), U256::ZERO));
    let submitter = Arc::new(RecordingSubmitter::default());
    let ctx = StrategyContext {
        chain_id: 8453,
        account: ACCOUNT,
        quoter: Arc::new(FixedQuoter),
        submitter: submitter.clone(),
        market: market.clone(),
    };
    Harness {
        agent: Agent::new(
            registry,
            FanOut::new(4, Duration::from_millis(500)),
            engine,
            ctx,
            settings,
        ),
        market,
        submitter,
    }
}

fn settings() -> AgentSettings {
    AgentSettings {
        portfolio_address: ACCOUNT,
        enable_strategies: true,
        enable_multichain: true,
        arbitrage_min_profit_pct: None,
        tick_interval: Duration::from_secs(30),
        state_file: None,
        basic_swap: BasicSwap::default(),
    }
}

fn grid_strategy() -> Strategy {
    Strategy::Grid(
        GridStrategy::new(
            2,
            GridParams {
                token_a: NATIVE_ASSET,
                token_b: USDC,
                base_price: U256::from(2000),
                price_step: U256::from(50),
                grid_size: 10,
                trade_amount: U256::from(1_000),
            },
        )
        .unwrap(),
    )
}

fn dca_strategy(interval_secs: u64) -> Strategy {
    Strategy::Dca(
        DcaStrategy::new(
            1,
            DcaParams {
                token_in: NATIVE_ASSET,
                token_out: USDC,
                amount: U256::from(100),
                interval_secs,
                max_executions: 2,
            },
            t0(),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_portfolio_survives_partial_outage() {
    let (registry, mocks) = three_chain_registry().await;
    let mut h = harness(registry, StrategyEngine::new(), settings());

    let report = h.agent.run_tick(t0()).await;
    assert!(report.warnings.is_empty());
    assert_eq!(h.agent.tracker().total_balance(NATIVE_ASSET), U256::from(16));
    assert_eq!(report.best_chain, Some(8453));

    // Polygon goes down and Base gets expensive.
    mocks[1].fail_all("503 Service Unavailable");
    mocks[0].set_balance(5);
    mocks[2].set_gas_price(100);

    let report = h.agent.run_tick(t0()).await;
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].chain_id, 137);
    assert_eq!(h.agent.tracker().balance_of(137, NATIVE_ASSET), U256::from(10));
    assert_eq!(h.agent.tracker().total_balance(NATIVE_ASSET), U256::from(17));
    assert_eq!(report.gas_quotes.len(), 2);
    assert_eq!(report.best_chain, Some(1));

    // Recovery picks the fresh value back up.
    mocks[1].clear_error();
    mocks[1].set_balance(11);
    let report = h.agent.run_tick(t0()).await;
    assert!(report.warnings.is_empty());
    assert_eq!(h.agent.tracker().total_balance(NATIVE_ASSET), U256::from(18));
}

#[tokio::test]
async fn test_all_chains_down_keeps_last_snapshot() {
    let (registry, mocks) = three_chain_registry().await;
    let mut h = harness(registry, StrategyEngine::new(), settings());
    h.agent.run_tick(t0()).await;
    let before = h.agent.tracker().snapshot().last_refresh;

    for mock in &mocks {
        mock.fail_all("connection refused");
    }
    let report = h.agent.run_tick(t0()).await;

    assert_eq!(report.warnings.len(), 3);
    assert!(report.best_chain.is_none());
    assert_eq!(h.agent.tracker().snapshot().last_refresh, before);
    assert_eq!(h.agent.tracker().total_balance(NATIVE_ASSET), U256::from(16));
}

#[tokio::test]
async fn test_grid_walks_levels_across_ticks() {
    let (registry, _) = three_chain_registry().await;
    let mut engine = StrategyEngine::new();
    engine.add(grid_strategy()).unwrap();
    let mut h = harness(registry, engine, settings());

    h.market.set_price(NATIVE_ASSET, USDC, U256::from(2000));
    let report = h.agent.run_tick(t0()).await;
    assert_eq!(report.strategies.executed.len(), 1);

    // Same level: nothing to do.
    let report = h.agent.run_tick(t0()).await;
    assert!(report.strategies.executed.is_empty());

    // Up one level sells token_a.
    h.market.set_price(NATIVE_ASSET, USDC, U256::from(2060));
    let report = h.agent.run_tick(t0()).await;
    match &report.strategies.executed[0].outcome {
        ExecutionOutcome::Swapped { token_in, token_out, .. } => {
            assert_eq!(*token_in, NATIVE_ASSET);
            assert_eq!(*token_out, USDC);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // Just below base is level -1 and buys token_a.
    h.market.set_price(NATIVE_ASSET, USDC, U256::from(1990));
    let report = h.agent.run_tick(t0()).await;
    match &report.strategies.executed[0].outcome {
        ExecutionOutcome::Swapped { token_in, .. } => assert_eq!(*token_in, USDC),
        other => panic!("unexpected outcome {other:?}"),
    }

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.chain_id == 8453 && r.account == ACCOUNT));

    match h.agent.engine().get(2).unwrap().state() {
        StrategyState::Grid { triggered_levels, .. } => assert_eq!(triggered_levels, vec![-1, 0, 1]),
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_submission_is_retried() {
    let (registry, _) = three_chain_registry().await;
    let mut engine = StrategyEngine::new();
    engine.add(dca_strategy(3600)).unwrap();
    let mut h = harness(registry, engine, settings());

    // Not due yet.
    let report = h.agent.run_tick(t0() + ChronoDuration::minutes(30)).await;
    assert!(report.strategies.executed.is_empty());
    assert!(report.strategies.failures.is_empty());

    h.submitter.set_error("nonce too low");
    let due = t0() + ChronoDuration::hours(1);
    let report = h.agent.run_tick(due).await;
    assert_eq!(report.strategies.failures.len(), 1);
    assert_eq!(report.strategies.failures[0].strategy_id, 1);

    h.submitter.clear_error();
    let report = h.agent.run_tick(due + ChronoDuration::seconds(30)).await;
    assert_eq!(report.strategies.executed.len(), 1);
    match h.agent.engine().get(1).unwrap().state() {
        StrategyState::Dca { executions_done, .. } => assert_eq!(executions_done, 1),
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn test_basic_swap_each_tick_when_steps_disabled() {
    let (registry, _) = three_chain_registry().await;
    let mut engine = StrategyEngine::new();
    engine.add(dca_strategy(60)).unwrap();
    let mut s = settings();
    s.enable_strategies = false;
    s.enable_multichain = false;
    let mut h = harness(registry, engine, s);

    let first = h.agent.run_tick(t0()).await;
    let second = h.agent.run_tick(t0() + ChronoDuration::minutes(1)).await;
    assert!(first.basic_swap.is_some());
    assert_ne!(first.basic_swap, second.basic_swap);

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.chain_id == 8453 && r.account == ACCOUNT));
    // Strategies stay untouched.
    assert!(first.strategies.executed.is_empty());
    assert!(h.agent.tracker().snapshot().last_refresh.is_none());

    h.submitter.set_error("insufficient funds");
    let failed = h.agent.run_tick(t0() + ChronoDuration::minutes(2)).await;
    assert!(failed.basic_swap.is_none());
    assert_eq!(failed.tick, 3);
}

#[tokio::test]
async fn test_dca_deactivates_after_max_executions() {
    let (registry, _) = three_chain_registry().await;
    let mut engine = StrategyEngine::new();
    engine.add(dca_strategy(60)).unwrap();
    let mut h = harness(registry, engine, settings());

    for minutes in 1..=4 {
        h.agent.run_tick(t0() + ChronoDuration::minutes(minutes)).await;
    }

    assert_eq!(h.submitter.requests().len(), 2);
    assert!(!h.agent.engine().get(1).unwrap().is_active());
    assert_eq!(h.agent.engine().active_count(), 0);
}

#[tokio::test]
async fn test_rebalance_reports_legs() {
    let (registry, _) = three_chain_registry().await;
    let mut engine = StrategyEngine::new();
    engine
        .add(Strategy::Rebalance(
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
            .unwrap(),
        ))
        .unwrap();
    let mut h = harness(registry, engine, settings());
    h.market.set_holding(NATIVE_ASSET, U256::from(80));
    h.market.set_holding(USDC, U256::from(20));

    // Drifted but inside the minimum interval.
    let report = h.agent.run_tick(t0() + ChronoDuration::hours(1)).await;
    assert!(report.strategies.executed.is_empty());

    let report = h.agent.run_tick(t0() + ChronoDuration::days(1)).await;
    match &report.strategies.executed[0].outcome {
        ExecutionOutcome::Rebalanced { legs } => {
            assert_eq!(legs.len(), 2);
            assert_eq!(legs[0].direction, LegDirection::Sell);
            assert_eq!(legs[0].amount, U256::from(20));
            assert_eq!(legs[1].direction, LegDirection::Buy);
            assert_eq!(legs[1].amount, U256::from(20));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // Legs are not routed through the submitter.
    assert!(h.submitter.requests().is_empty());
}

#[tokio::test]
async fn test_arbitrage_scan_across_chains() {
    let (registry, _) = three_chain_registry().await;
    let mut s = settings();
    s.arbitrage_min_profit_pct = Some(1);
    let mut h = harness(registry, StrategyEngine::new(), s);

    h.market.set_chain_price(1, NATIVE_ASSET, U256::from(2000));
    h.market.set_chain_price(137, NATIVE_ASSET, U256::from(2010));
    h.market.set_chain_price(8453, NATIVE_ASSET, U256::from(2100));

    let report = h.agent.run_tick(t0()).await;
    // 1 -> 137 is 0%, 1 -> 8453 is 5%, 137 -> 8453 is 4%.
    assert_eq!(report.opportunities.len(), 2);
    assert_eq!(report.opportunities[0].source_chain, 1);
    assert_eq!(report.opportunities[0].destination_chain, 8453);
    assert_eq!(report.opportunities[0].profit_pct, 5);
    assert_eq!(report.opportunities[1].source_chain, 137);
    assert_eq!(report.opportunities[1].profit_pct, 4);
}

#[tokio::test]
async fn test_state_file_round_trip() {
    let (registry, _) = three_chain_registry().await;
    let path = std::env::temp_dir().join(format!("sentinel_it_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let mut engine = StrategyEngine::new();
    engine.add(grid_strategy()).unwrap();
    let mut h = harness(registry.clone(), engine, settings());
    h.agent.run_tick(t0()).await;
    storage::save_state(&h.agent.persisted_state(t0()), Some(&path)).unwrap();

    let mut engine = StrategyEngine::new();
    engine.add(grid_strategy()).unwrap();
    let mut restarted = harness(registry, engine, settings());
    let saved = storage::load_state(Some(&path)).unwrap().unwrap();
    restarted.agent.restore(saved);

    // Level 0 already traded before the restart.
    let report = restarted.agent.run_tick(t0()).await;
    assert!(report.strategies.executed.is_empty());
    assert_eq!(report.tick, 2);

    storage::delete_state(Some(&path)).unwrap();
}
