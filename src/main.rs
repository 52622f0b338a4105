//! SENTINEL: multi-chain portfolio and strategy agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the configured chains, restores strategy state from disk
//! and runs the tick loop with graceful shutdown.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use sentinel::agent::{Agent, AgentSettings};
use sentinel::chain::ChainRegistry;
use sentinel::config::{self, EnvConfig};
use sentinel::dashboard::{self, DashboardState};
use sentinel::execution::{AggregatorQuoter, DryRunSubmitter};
use sentinel::storage;
use sentinel::strategy::{StrategyContext, StrategyEngine};

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Multi-chain portfolio and strategy agent
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tick_interval_secs = cfg.agent.tick_interval_secs,
        trade_chain_id = cfg.agent.trade_chain_id,
        "SENTINEL starting up"
    );

    // -- Environment -----------------------------------------------------

    let descriptors = config::default_chains();
    let chain_ids: Vec<_> = descriptors.iter().map(|d| d.chain_id).collect();
    let env = match EnvConfig::from_env(&chain_ids) {
        Ok(env) => env,
        Err(e) => {
            error!(error = %e, "Startup aborted");
            return Err(e.into());
        }
    };
    info!(
        signer = %env.signer_address,
        smart_account = %env.smart_account,
        key_bytes = env.private_key_len(),
        strategies = env.enable_strategies,
        multichain = env.enable_multichain,
        "Environment loaded"
    );

    // -- Chains ----------------------------------------------------------

    let registry = Arc::new(ChainRegistry::new());
    let outcomes = registry.register_all(&cfg.agent.fanout(), descriptors.clone()).await;
    let connected = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
    info!(connected, configured = outcomes.len(), "Chains registered");
    if connected == 0 {
        warn!("No chains reachable; ticks will only report warnings");
    }

    // -- Strategies ------------------------------------------------------

    let now = Utc::now();
    let mut engine = StrategyEngine::new();
    for strategy_cfg in &cfg.strategies {
        let strategy = strategy_cfg.build(now)?;
        engine.add(strategy)?;
    }

    let quoter = AggregatorQuoter::new(&cfg.aggregator.default_url)?.with_endpoints(&descriptors);
    let trade_chain = cfg.agent.trade_chain_id;
    let ctx = StrategyContext {
        chain_id: trade_chain,
        account: env.account_for(trade_chain),
        quoter: Arc::new(quoter),
        submitter: Arc::new(DryRunSubmitter::with_signer(env.signer_address)),
        market: Arc::new(cfg.market.build()?),
    };

    // -- Agent -----------------------------------------------------------

    let state_file = cfg
        .agent
        .state_file
        .clone()
        .unwrap_or_else(|| storage::DEFAULT_STATE_FILE.to_string());

    let settings = AgentSettings {
        portfolio_address: env.signer_address,
        enable_strategies: env.enable_strategies,
        enable_multichain: env.enable_multichain,
        arbitrage_min_profit_pct: cfg.arbitrage.enabled.then_some(cfg.arbitrage.min_profit_pct),
        tick_interval: cfg.agent.tick_interval(),
        state_file: Some(state_file.clone()),
        basic_swap: cfg.agent.basic_swap()?,
    };

    let mut agent = Agent::new(Arc::clone(&registry), cfg.agent.fanout(), engine, ctx, settings);

    match storage::load_state(Some(&state_file))? {
        Some(saved) => agent.restore(saved),
        None => info!("Fresh start"),
    }

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(registry.all()));
        dashboard::spawn_dashboard(Arc::clone(&state), cfg.dashboard.port).await?;
        agent = agent.with_dashboard(state);
    }

    // -- Main loop -------------------------------------------------------

    agent
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter; `SENTINEL_LOG_JSON` switches
/// to JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
