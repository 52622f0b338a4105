//! Cross-chain portfolio tracker.
//!
//! Polls the native-asset balance of one address on every registered
//! chain and aggregates the result into a `PortfolioSnapshot`. A chain
//! whose query fails keeps its previous balances (and previous refresh
//! time) so that staleness stays visible instead of reading as zero.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::fanout::FanOut;
use crate::chain::ChainRegistry;
use crate::types::{ChainId, ChainWarning};

// ---------------------------------------------------------------------------
// Valuation hook
// ---------------------------------------------------------------------------

/// Mocked USD per native unit, in the absence of a price oracle.
pub const DEFAULT_CONVERSION_RATE: u64 = 2000;

/// Converts a balance into the common valuation unit.
///
/// Pluggable so that a real oracle can replace the fixed-rate stub.
pub trait Valuation: Send + Sync {
    fn value_of(&self, chain_id: ChainId, asset: Address, balance: U256) -> U256;
}

/// Multiplies every balance by a constant rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateValuation {
    pub rate: U256,
}

impl Default for FixedRateValuation {
    fn default() -> Self {
        Self {
            rate: U256::from(DEFAULT_CONVERSION_RATE),
        }
    }
}

impl Valuation for FixedRateValuation {
    fn value_of(&self, _chain_id: ChainId, _asset: Address, balance: U256) -> U256 {
        balance.saturating_mul(self.rate)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Balances held on one chain as of its last successful refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainHoldings {
    pub balances: BTreeMap<Address, U256>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of holdings across all chains.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSnapshot {
    pub address: Address,
    pub chains: BTreeMap<ChainId, ChainHoldings>,
    pub total_value: U256,
    /// Time of the last refresh in which at least one chain succeeded.
    pub last_refresh: Option<DateTime<Utc>>,
}

impl PortfolioSnapshot {
    /// Balance of `asset` on `chain_id`, zero when absent.
    pub fn balance_of(&self, chain_id: ChainId, asset: Address) -> U256 {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.balances.get(&asset))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Sum of `asset` across every chain, zero when absent.
    pub fn total_balance(&self, asset: Address) -> U256 {
        self.chains
            .values()
            .filter_map(|c| c.balances.get(&asset))
            .fold(U256::ZERO, |acc, b| acc.saturating_add(*b))
    }

    /// Age of the snapshot. `None` if no refresh ever succeeded.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_refresh.map(|t| now - t)
    }

    /// Age of one chain's balances. `None` if that chain never refreshed.
    pub fn chain_age(&self, chain_id: ChainId, now: DateTime<Utc>) -> Option<Duration> {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.refreshed_at)
            .map(|t| now - t)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct PortfolioTracker {
    registry: Arc<ChainRegistry>,
    valuation: Box<dyn Valuation>,
    fanout: FanOut,
    snapshot: PortfolioSnapshot,
}

impl PortfolioTracker {
    pub fn new(registry: Arc<ChainRegistry>, fanout: FanOut) -> Self {
        Self::with_valuation(registry, fanout, Box::new(FixedRateValuation::default()))
    }

    pub fn with_valuation(
        registry: Arc<ChainRegistry>,
        fanout: FanOut,
        valuation: Box<dyn Valuation>,
    ) -> Self {
        Self {
            registry,
            valuation,
            fanout,
            snapshot: PortfolioSnapshot::default(),
        }
    }

    /// Refresh native balances of `address` on every registered chain.
    ///
    /// Per-chain failures become warnings and leave that chain's prior
    /// balances in place. The previous snapshot is replaced only once all
    /// queries have completed or timed out.
    pub async fn refresh(&mut self, address: Address) -> (PortfolioSnapshot, Vec<ChainWarning>) {
        info!(%address, "Updating cross-chain portfolio");

        let connections: HashMap<ChainId, _> = self
            .registry
            .connections()
            .into_iter()
            .map(|(d, c)| (d.chain_id, (d, c)))
            .collect();
        let order = self.registry.chain_ids();

        let results = self
            .fanout
            .run(order, |chain_id| {
                let conn = connections.get(&chain_id).map(|(_, c)| Arc::clone(c));
                async move {
                    match conn {
                        Some(client) => client.balance_of(address).await,
                        None => anyhow::bail!("chain {chain_id} has no connection"),
                    }
                }
            })
            .await;

        let now = Utc::now();
        let mut next = PortfolioSnapshot {
            address,
            chains: BTreeMap::new(),
            total_value: U256::ZERO,
            last_refresh: self.snapshot.last_refresh,
        };
        // A different address starts from a clean slate.
        let empty = BTreeMap::new();
        let prior = if self.snapshot.address == address {
            &self.snapshot.chains
        } else {
            &empty
        };
        let mut warnings = Vec::new();
        let mut any_success = false;

        for (chain_id, outcome) in results {
            match outcome.into_result() {
                Ok(balance) => {
                    let Some((descriptor, _)) = connections.get(&chain_id) else {
                        continue;
                    };
                    debug!(chain = %descriptor.name, chain_id, %balance, "Native balance");
                    let mut holdings = ChainHoldings {
                        balances: BTreeMap::new(),
                        refreshed_at: Some(now),
                    };
                    holdings.balances.insert(descriptor.native_asset, balance);
                    next.chains.insert(chain_id, holdings);
                    any_success = true;
                }
                Err(e) => {
                    warn!(chain_id, error = %e, "Failed to get native balance; keeping prior value");
                    warnings.push(ChainWarning {
                        chain_id,
                        message: format!("{e:#}"),
                        at: now,
                    });
                    if let Some(stale) = prior.get(&chain_id) {
                        next.chains.insert(chain_id, stale.clone());
                    }
                }
            }
        }

        if any_success {
            next.last_refresh = Some(now);
        }
        next.total_value = self.valuate(&next);

        info!(
            total_value = %next.total_value,
            chains = next.chains.len(),
            warnings = warnings.len(),
            "Portfolio refreshed"
        );

        self.snapshot = next;
        (self.snapshot.clone(), warnings)
    }

    fn valuate(&self, snapshot: &PortfolioSnapshot) -> U256 {
        snapshot
            .chains
            .iter()
            .flat_map(|(chain_id, holdings)| {
                holdings
                    .balances
                    .iter()
                    .map(move |(asset, balance)| (*chain_id, *asset, *balance))
            })
            .fold(U256::ZERO, |acc, (chain_id, asset, balance)| {
                acc.saturating_add(self.valuation.value_of(chain_id, asset, balance))
            })
    }

    /// The last snapshot produced by `refresh`.
    pub fn snapshot(&self) -> &PortfolioSnapshot {
        &self.snapshot
    }

    pub fn balance_of(&self, chain_id: ChainId, asset: Address) -> U256 {
        self.snapshot.balance_of(chain_id, asset)
    }

    pub fn total_balance(&self, asset: Address) -> U256 {
        self.snapshot.total_balance(asset)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
