//! Gas-cost arbitration across chains.
//!
//! Queries the current gas price on every registered chain and picks the
//! one where a transaction of the given category is cheapest.

use std::sync::Arc;

use alloy_primitives::U256;
use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::fanout::FanOut;
use crate::chain::ChainRegistry;
use crate::types::{ChainId, SentinelError, TxCategory};

/// Reference gas limit used for every category in the base design.
pub const BASE_GAS_LIMIT: u64 = 100_000;

/// Estimated cost of a transaction on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GasQuote {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub gas_price: U256,
    pub estimated_cost: U256,
}

pub struct GasArbiter {
    registry: Arc<ChainRegistry>,
    fanout: FanOut,
}

impl GasArbiter {
    pub fn new(registry: Arc<ChainRegistry>, fanout: FanOut) -> Self {
        Self { registry, fanout }
    }

    /// Reference gas limit for a category.
    ///
    /// Every category maps to the same constant for now; callers should not
    /// rely on that.
    pub fn reference_gas_limit(category: TxCategory) -> U256 {
        match category {
            TxCategory::Swap | TxCategory::Transfer | TxCategory::Approval => {
                U256::from(BASE_GAS_LIMIT)
            }
        }
    }

    /// Per-chain cost estimates, in registration order. Chains whose gas
    /// price query failed are omitted (and logged).
    pub async fn quotes(&self, category: TxCategory) -> Vec<GasQuote> {
        let connections = self.registry.connections();
        let gas_limit = Self::reference_gas_limit(category);

        let results = self
            .fanout
            .run(connections.iter().map(|(d, _)| d.chain_id), |chain_id| {
                let client = connections
                    .iter()
                    .find(|(d, _)| d.chain_id == chain_id)
                    .map(|(_, c)| Arc::clone(c));
                async move {
                    match client {
                        Some(c) => c.gas_price().await,
                        None => anyhow::bail!("chain {chain_id} has no connection"),
                    }
                }
            })
            .await;

        let mut quotes = Vec::with_capacity(results.len());
        for ((descriptor, _), (chain_id, outcome)) in connections.iter().zip(results) {
            match outcome.into_result() {
                Ok(gas_price) => {
                    let estimated_cost = gas_price.saturating_mul(gas_limit);
                    info!(
                        chain = %descriptor.name,
                        chain_id,
                        cost_wei = %estimated_cost,
                        "Gas cost"
                    );
                    quotes.push(GasQuote {
                        chain_id,
                        chain_name: descriptor.name.clone(),
                        gas_price,
                        estimated_cost,
                    });
                }
                Err(e) => {
                    warn!(chain_id, error = %e, "Failed to get gas price");
                }
            }
        }
        quotes
    }

    /// The chain with the strictly lowest estimated cost for `category`.
    /// Ties keep the first chain seen.
    pub async fn best_chain(&self, category: TxCategory) -> Result<ChainId> {
        let quotes = self.quotes(category).await;
        let best = Self::best_of(&quotes)?;

        info!(
            category = %category,
            chain = %best.chain_name,
            chain_id = best.chain_id,
            cost_wei = %best.estimated_cost,
            "Best chain selected"
        );
        Ok(best.chain_id)
    }

    /// Cheapest of an already-fetched quote table.
    pub fn best_of(quotes: &[GasQuote]) -> Result<&GasQuote, SentinelError> {
        select_cheapest(quotes).ok_or(SentinelError::NoAvailableChain)
    }
}

/// First quote with the strictly lowest cost.
fn select_cheapest(quotes: &[GasQuote]) -> Option<&GasQuote> {
    let mut best: Option<&GasQuote> = None;
    for q in quotes {
        match best {
            Some(b) if q.estimated_cost >= b.estimated_cost => {}
            _ => best = Some(q),
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
