//! Configuration loading from TOML with environment variable resolution.
//!
//! `config.toml` holds tunables and strategy definitions. Key material,
//! account addresses, RPC overrides and feature toggles come from the
//! environment (optionally via `.env`). A missing required value is a
//! `FatalConfiguration` error and aborts startup.

use std::collections::HashMap;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::agent::BasicSwap;
use crate::engine::arbitrage::DEFAULT_MIN_PROFIT_PCT;
use crate::engine::FanOut;
use crate::execution::quote::DEFAULT_AGGREGATOR_URL;
use crate::strategy::dca::{DcaParams, DcaStrategy};
use crate::strategy::grid::{GridParams, GridStrategy};
use crate::strategy::market::StaticMarketData;
use crate::strategy::rebalance::{RebalanceParams, RebalanceStrategy};
use crate::strategy::Strategy;
use crate::types::{ChainDescriptor, ChainId, SentinelError, NATIVE_ASSET};

// ---------------------------------------------------------------------------
// File configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Chain strategies submit swaps on.
    #[serde(default = "default_trade_chain")]
    pub trade_chain_id: ChainId,
    #[serde(default)]
    pub state_file: Option<String>,
    /// Swap made each tick when strategies and multichain are both off.
    #[serde(default)]
    pub basic_swap: Option<BasicSwapConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BasicSwapConfig {
    pub token_in: Address,
    pub token_out: Address,
    pub amount: String,
}

fn default_tick_interval() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    5_000
}

fn default_max_concurrency() -> usize {
    8
}

fn default_trade_chain() -> ChainId {
    195
}

impl AgentConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn fanout(&self) -> FanOut {
        FanOut::new(self.max_concurrency, Duration::from_millis(self.query_timeout_ms))
    }

    /// The configured basic swap, or native asset to USDC for 0.1 native.
    pub fn basic_swap(&self) -> Result<BasicSwap, SentinelError> {
        let Some(cfg) = &self.basic_swap else {
            return Ok(BasicSwap::default());
        };
        Ok(BasicSwap {
            token_in: cfg.token_in,
            token_out: cfg.token_out,
            amount: parse_amount("agent.basic_swap.amount", &cfg.amount)?,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArbitrageConfig {
    pub enabled: bool,
    pub min_profit_pct: u64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_profit_pct: DEFAULT_MIN_PROFIT_PCT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    pub default_url: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_url: DEFAULT_AGGREGATOR_URL.to_string(),
        }
    }
}

/// Stub market data served until a price oracle is wired in.
/// Amounts are decimal strings so they can exceed `u64`.
#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    pub default_price: String,
    pub default_holding: String,
    #[serde(default)]
    pub prices: Vec<PriceEntry>,
    #[serde(default)]
    pub holdings: Vec<HoldingEntry>,
    /// Per-chain prices used by the arbitrage scanner.
    #[serde(default)]
    pub chain_prices: Vec<ChainPriceEntry>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_price: "1000000000000000000".into(),
            default_holding: "1000000000000000000".into(),
            prices: Vec::new(),
            holdings: Vec::new(),
            chain_prices: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceEntry {
    pub base: Address,
    pub quote: Address,
    pub price: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainPriceEntry {
    pub chain_id: ChainId,
    pub asset: Address,
    pub price: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HoldingEntry {
    pub asset: Address,
    pub value: String,
}

impl MarketConfig {
    pub fn build(&self) -> Result<StaticMarketData, SentinelError> {
        let market = StaticMarketData::new(
            parse_amount("market.default_price", &self.default_price)?,
            parse_amount("market.default_holding", &self.default_holding)?,
        );
        for p in &self.prices {
            market.set_price(p.base, p.quote, parse_amount("market.prices.price", &p.price)?);
        }
        for h in &self.holdings {
            market.set_holding(h.asset, parse_amount("market.holdings.value", &h.value)?);
        }
        for c in &self.chain_prices {
            market.set_chain_price(c.chain_id, c.asset, parse_amount("market.chain_prices.price", &c.price)?);
        }
        Ok(market)
    }
}

/// One `[[strategies]]` entry.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Dca {
        id: u64,
        token_in: Address,
        token_out: Address,
        amount: String,
        interval_secs: u64,
        max_executions: u32,
    },
    Grid {
        id: u64,
        token_a: Address,
        token_b: Address,
        base_price: String,
        price_step: String,
        grid_size: u32,
        trade_amount: String,
    },
    Rebalance {
        id: u64,
        assets: Vec<Address>,
        target_bps: Vec<u64>,
        threshold_bps: u64,
        min_interval_secs: u64,
    },
}

impl StrategyConfig {
    pub fn id(&self) -> u64 {
        match self {
            StrategyConfig::Dca { id, .. }
            | StrategyConfig::Grid { id, .. }
            | StrategyConfig::Rebalance { id, .. } => *id,
        }
    }

    /// Validate and instantiate the strategy.
    pub fn build(&self, now: DateTime<Utc>) -> Result<Strategy, SentinelError> {
        let strategy = match self {
            StrategyConfig::Dca {
                id,
                token_in,
                token_out,
                amount,
                interval_secs,
                max_executions,
            } => Strategy::Dca(DcaStrategy::new(
                *id,
                DcaParams {
                    token_in: *token_in,
                    token_out: *token_out,
                    amount: parse_amount("amount", amount)?,
                    interval_secs: *interval_secs,
                    max_executions: *max_executions,
                },
                now,
            )?),
            StrategyConfig::Grid {
                id,
                token_a,
                token_b,
                base_price,
                price_step,
                grid_size,
                trade_amount,
            } => Strategy::Grid(GridStrategy::new(
                *id,
                GridParams {
                    token_a: *token_a,
                    token_b: *token_b,
                    base_price: parse_amount("base_price", base_price)?,
                    price_step: parse_amount("price_step", price_step)?,
                    grid_size: *grid_size,
                    trade_amount: parse_amount("trade_amount", trade_amount)?,
                },
            )?),
            StrategyConfig::Rebalance {
                id,
                assets,
                target_bps,
                threshold_bps,
                min_interval_secs,
            } => Strategy::Rebalance(RebalanceStrategy::new(
                *id,
                RebalanceParams {
                    assets: assets.clone(),
                    target_bps: target_bps.clone(),
                    threshold_bps: *threshold_bps,
                    min_interval_secs: *min_interval_secs,
                },
                now,
            )?),
        };
        Ok(strategy)
    }
}

fn parse_amount(field: &str, value: &str) -> Result<U256, SentinelError> {
    U256::from_str(value.trim())
        .map_err(|e| SentinelError::FatalConfiguration(format!("{field}: invalid amount {value:?}: {e}")))
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name).with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

const ONE_INCH_BASE: &str = "https://api.1inch.io/v5.0";

/// Built-in chain table. Each RPC URL can be overridden by the named
/// environment variable.
const DEFAULT_CHAINS: &[(ChainId, &str, &str, &str, bool, u64)] = &[
    (1, "Ethereum Mainnet", "https://eth.llamarpc.com", "ETHEREUM_RPC", false, 12),
    (137, "Polygon", "https://polygon-rpc.com", "POLYGON_RPC", false, 2),
    (42161, "Arbitrum One", "https://arb1.arbitrum.io/rpc", "ARBITRUM_RPC", false, 1),
    (10, "Optimism", "https://mainnet.optimism.io", "OPTIMISM_RPC", false, 2),
    (8453, "Base", "https://mainnet.base.org", "BASE_RPC", false, 2),
    (195, "X Layer Testnet", "https://testrpc.xlayer.tech", "X_LAYER_RPC", true, 3),
    (196, "X Layer Mainnet", "https://rpc.xlayer.tech", "X_LAYER_MAINNET_RPC", false, 3),
];

/// The supported networks, with RPC overrides from the environment
/// applied. Empty overrides are ignored.
pub fn default_chains() -> Vec<ChainDescriptor> {
    DEFAULT_CHAINS
        .iter()
        .map(|&(chain_id, name, rpc, env, is_testnet, block_time_secs)| {
            let rpc_url = std::env::var(env)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| rpc.to_string());
            let aggregator_url = if matches!(chain_id, 195 | 196) {
                DEFAULT_AGGREGATOR_URL.to_string()
            } else {
                format!("{ONE_INCH_BASE}/{chain_id}")
            };
            ChainDescriptor {
                chain_id,
                name: name.to_string(),
                rpc_url,
                native_asset: NATIVE_ASSET,
                aggregator_url,
                is_testnet,
                block_time_secs,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Values taken from the process environment.
pub struct EnvConfig {
    /// Signing key, 32 bytes hex. Never logged.
    pub private_key: SecretString,
    /// EOA derived from `private_key`. Its native balances are the ones
    /// the portfolio tracks.
    pub signer_address: Address,
    pub smart_account: Address,
    /// Per-chain smart accounts from `SMART_ACCOUNT_<CHAINID>`.
    pub smart_accounts: HashMap<ChainId, Address>,
    pub enable_strategies: bool,
    pub enable_multichain: bool,
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig")
            .field("private_key", &"[REDACTED]")
            .field("signer_address", &self.signer_address)
            .field("smart_account", &self.smart_account)
            .field("smart_accounts", &self.smart_accounts)
            .field("enable_strategies", &self.enable_strategies)
            .field("enable_multichain", &self.enable_multichain)
            .finish()
    }
}

impl EnvConfig {
    /// Read the environment. `chain_ids` selects which
    /// `SMART_ACCOUNT_<CHAINID>` overrides are looked up.
    pub fn from_env(chain_ids: &[ChainId]) -> Result<Self, SentinelError> {
        let private_key = required("PRIVATE_KEY")?;
        let signer_address = signer_address(&private_key)?;

        let smart_account = parse_address("SMART_ACCOUNT", &required("SMART_ACCOUNT")?)?;

        let mut smart_accounts = HashMap::new();
        for chain_id in chain_ids {
            let name = format!("SMART_ACCOUNT_{chain_id}");
            if let Some(value) = optional(&name) {
                smart_accounts.insert(*chain_id, parse_address(&name, &value)?);
            }
        }

        Ok(Self {
            private_key: SecretString::new(private_key),
            signer_address,
            smart_account,
            smart_accounts,
            enable_strategies: flag("ENABLE_STRATEGIES"),
            enable_multichain: flag("ENABLE_MULTICHAIN"),
        })
    }

    /// Smart account for `chain_id`, falling back to `SMART_ACCOUNT`.
    pub fn account_for(&self, chain_id: ChainId) -> Address {
        self.smart_accounts
            .get(&chain_id)
            .copied()
            .unwrap_or(self.smart_account)
    }

    /// Length of the decoded key, for startup diagnostics.
    pub fn private_key_len(&self) -> usize {
        self.private_key
            .expose_secret()
            .trim_start_matches("0x")
            .len()
            / 2
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, SentinelError> {
    optional(name).ok_or_else(|| SentinelError::FatalConfiguration(format!("{name} is not set")))
}

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true").unwrap_or(false)
}

fn parse_address(name: &str, value: &str) -> Result<Address, SentinelError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| SentinelError::FatalConfiguration(format!("{name}: invalid address: {e}")))
}

/// Check the key is a usable secp256k1 scalar and return its address.
fn signer_address(key: &str) -> Result<Address, SentinelError> {
    let bytes = hex::decode(key.trim().trim_start_matches("0x"))
        .map_err(|_| SentinelError::FatalConfiguration("PRIVATE_KEY is not valid hex".into()))?;
    if bytes.len() != 32 {
        return Err(SentinelError::FatalConfiguration(format!(
            "PRIVATE_KEY must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let signer = PrivateKeySigner::from_bytes(&B256::from_slice(&bytes))
        .map_err(|e| SentinelError::FatalConfiguration(format!("PRIVATE_KEY is not a valid key: {e}")))?;
    Ok(signer.address())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::with_locked_env;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const ACCOUNT: &str = "0x5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a";

    const SAMPLE: &str = r#"
        [agent]
        name = "SENTINEL-001"
        tick_interval_secs = 30

        [dashboard]
        enabled = true
        port = 8080

        [market]
        default_price = "2000"
        default_holding = "1000000000000000000"

        [[strategies]]
        kind = "dca"
        id = 1
        token_in = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"
        token_out = "0x74b7F16337b8972027F6196A17a631aC6dE26d22"
        amount = "100000000000000000"
        interval_secs = 3600
        max_executions = 24

        [[strategies]]
        kind = "grid"
        id = 2
        token_a = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"
        token_b = "0x74b7F16337b8972027F6196A17a631aC6dE26d22"
        base_price = "2000"
        price_step = "50"
        grid_size = 10
        trade_amount = "1000000000000000000"

        [[strategies]]
        kind = "rebalance"
        id = 3
        assets = ["0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE", "0x74b7F16337b8972027F6196A17a631aC6dE26d22"]
        target_bps = [6000, 4000]
        threshold_bps = 500
        min_interval_secs = 86400
    "#;

    #[test]
    fn test_parse_sample() {
        let cfg = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.agent.name, "SENTINEL-001");
        assert_eq!(cfg.agent.query_timeout_ms, 5_000);
        assert_eq!(cfg.agent.trade_chain_id, 195);
        assert_eq!(cfg.arbitrage.min_profit_pct, 1);
        assert_eq!(cfg.strategies.len(), 3);
        assert_eq!(cfg.strategies[1].id(), 2);

        let now = Utc::now();
        let built: Vec<_> = cfg.strategies.iter().map(|s| s.build(now).unwrap()).collect();
        assert_eq!(built[2].kind(), crate::strategy::StrategyKind::Rebalance);
    }

    #[test]
    fn test_bad_amount_is_fatal() {
        let cfg = StrategyConfig::Grid {
            id: 2,
            token_a: NATIVE_ASSET,
            token_b: Address::ZERO,
            base_price: "two thousand".into(),
            price_step: "50".into(),
            grid_size: 10,
            trade_amount: "1".into(),
        };
        assert!(matches!(
            cfg.build(Utc::now()),
            Err(SentinelError::FatalConfiguration(_))
        ));
    }

    #[test]
    fn test_invalid_strategy_surfaces() {
        let cfg = StrategyConfig::Rebalance {
            id: 3,
            assets: vec![NATIVE_ASSET],
            target_bps: vec![5000],
            threshold_bps: 500,
            min_interval_secs: 0,
        };
        assert!(matches!(
            cfg.build(Utc::now()),
            Err(SentinelError::InvalidStrategy { strategy_id: 3, .. })
        ));
    }

    #[test]
    fn test_market_overrides() {
        let cfg = AppConfig::from_toml(
            r#"
            [agent]
            name = "x"
            [dashboard]
            enabled = false
            port = 1
            [market]
            default_price = "1"
            default_holding = "0"
            [[market.prices]]
            base = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"
            quote = "0x74b7F16337b8972027F6196A17a631aC6dE26d22"
            price = "2100"
            "#,
        )
        .unwrap();
        let market = cfg.market.build().unwrap();
        let usdc: Address = "0x74b7F16337b8972027F6196A17a631aC6dE26d22".parse().unwrap();
        let price = tokio_test::block_on(crate::strategy::market::MarketData::price(
            &market,
            NATIVE_ASSET,
            usdc,
        ))
        .unwrap();
        assert_eq!(price, U256::from(2100));
    }

    #[test]
    fn test_basic_swap_defaults_and_override() {
        let cfg = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.agent.basic_swap().unwrap(), BasicSwap::default());

        let cfg = AppConfig::from_toml(
            r#"
            [agent]
            name = "x"
            [agent.basic_swap]
            token_in = "0x74b7F16337b8972027F6196A17a631aC6dE26d22"
            token_out = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"
            amount = "5000000"
            [dashboard]
            enabled = false
            port = 1
            "#,
        )
        .unwrap();
        let swap = cfg.agent.basic_swap().unwrap();
        assert_eq!(swap.token_out, NATIVE_ASSET);
        assert_eq!(swap.amount, U256::from(5_000_000u64));
    }

    #[test]
    fn test_default_chains_with_override() {
        with_locked_env(&[("BASE_RPC", Some("http://base.local")), ("ETHEREUM_RPC", Some(""))], || {
            let chains = default_chains();
            assert_eq!(chains.len(), 7);
            let ids: Vec<_> = chains.iter().map(|c| c.chain_id).collect();
            assert_eq!(ids, vec![1, 137, 42161, 10, 8453, 195, 196]);

            let base = chains.iter().find(|c| c.chain_id == 8453).unwrap();
            assert_eq!(base.rpc_url, "http://base.local");
            // Empty override falls back to the built-in URL.
            assert_eq!(chains[0].rpc_url, "https://eth.llamarpc.com");
            assert_eq!(chains[0].aggregator_url, "https://api.1inch.io/v5.0/1");

            let xlayer = chains.iter().find(|c| c.chain_id == 195).unwrap();
            assert!(xlayer.is_testnet);
            assert_eq!(xlayer.aggregator_url, DEFAULT_AGGREGATOR_URL);
        });
    }

    #[test]
    fn test_env_missing_key_is_fatal() {
        with_locked_env(&[("PRIVATE_KEY", None), ("SMART_ACCOUNT", Some(ACCOUNT))], || {
            let err = EnvConfig::from_env(&[]).unwrap_err();
            assert!(err.to_string().contains("PRIVATE_KEY is not set"));
        });
    }

    #[test]
    fn test_env_short_key_is_fatal() {
        with_locked_env(&[("PRIVATE_KEY", Some("0xabcd")), ("SMART_ACCOUNT", Some(ACCOUNT))], || {
            let err = EnvConfig::from_env(&[]).unwrap_err();
            assert!(err.to_string().contains("32 bytes"));
        });
    }

    #[test]
    fn test_env_zero_key_is_fatal() {
        let zero = format!("0x{}", "0".repeat(64));
        with_locked_env(&[("PRIVATE_KEY", Some(zero.as_str())), ("SMART_ACCOUNT", Some(ACCOUNT))], || {
            let err = EnvConfig::from_env(&[]).unwrap_err();
            assert!(err.to_string().contains("not a valid key"));
        });
    }

    #[test]
    fn test_env_full() {
        with_locked_env(
            &[
                ("PRIVATE_KEY", Some(KEY)),
                ("SMART_ACCOUNT", Some(ACCOUNT)),
                ("SMART_ACCOUNT_196", Some("0x0000000000000000000000000000000000000196")),
                ("ENABLE_STRATEGIES", Some("true")),
                ("ENABLE_MULTICHAIN", Some("yes")),
            ],
            || {
                let env = EnvConfig::from_env(&[195, 196]).unwrap();
                assert!(env.enable_strategies);
                // Only the literal "true" enables a toggle.
                assert!(!env.enable_multichain);
                assert_eq!(env.account_for(195), ACCOUNT.parse::<Address>().unwrap());
                assert_ne!(env.account_for(196), env.smart_account);
                assert_eq!(env.private_key_len(), 32);
                assert_eq!(
                    env.signer_address,
                    "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".parse::<Address>().unwrap()
                );
                assert!(!format!("{env:?}").contains("4c0883"));
            },
        );
    }
}
