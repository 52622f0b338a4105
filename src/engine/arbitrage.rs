//! Cross-chain arbitrage scanner.
//!
//! Compares an asset's price across every pair of chains and reports the
//! pairs where the destination trades sufficiently above the source.
//! Scanning is read-only; acting on an opportunity is a separate step and
//! must go through `revalidate` first, since prices may have moved.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use tracing::{debug, info, warn};

use crate::chain::ChainRegistry;
use crate::types::{ArbitrageOpportunity, ChainId};

/// Opportunities must beat this whole-percent profit (strictly).
pub const DEFAULT_MIN_PROFIT_PCT: u64 = 1;

pub struct ArbitrageScanner {
    registry: Arc<ChainRegistry>,
    min_profit_pct: u64,
}

impl ArbitrageScanner {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self::with_threshold(registry, DEFAULT_MIN_PROFIT_PCT)
    }

    pub fn with_threshold(registry: Arc<ChainRegistry>, min_profit_pct: u64) -> Self {
        Self {
            registry,
            min_profit_pct,
        }
    }

    pub fn min_profit_pct(&self) -> u64 {
        self.min_profit_pct
    }

    /// Compare prices for every pair (A, B) with A before B in `chain_ids`.
    ///
    /// The asset compared is A's native asset. `price_fn(chain, asset)`
    /// supplies prices; a failed lookup skips the affected pairs.
    pub fn scan<F>(&self, chain_ids: &[ChainId], price_fn: F) -> Result<Vec<ArbitrageOpportunity>>
    where
        F: Fn(ChainId, Address) -> Result<U256>,
    {
        let natives = chain_ids
            .iter()
            .map(|id| self.registry.lookup(*id).map(|d| d.native_asset))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cache: HashMap<(ChainId, Address), Option<U256>> = HashMap::new();
        let mut price = |chain_id: ChainId, asset: Address| -> Option<U256> {
            *cache.entry((chain_id, asset)).or_insert_with(|| {
                match price_fn(chain_id, asset) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(chain_id, %asset, error = %e, "Price lookup failed");
                        None
                    }
                }
            })
        };

        let mut opportunities = Vec::new();
        for (i, &chain_a) in chain_ids.iter().enumerate() {
            for &chain_b in &chain_ids[i + 1..] {
                if chain_a == chain_b {
                    continue;
                }
                let asset = natives[i];
                let (Some(price_a), Some(price_b)) = (price(chain_a, asset), price(chain_b, asset))
                else {
                    continue;
                };
                if price_a.is_zero() {
                    warn!(chain_id = chain_a, %asset, "Zero source price, skipping pair");
                    continue;
                }

                match self.evaluate(chain_a, chain_b, asset, price_a, price_b) {
                    Some(opp) => {
                        info!(
                            source = chain_a,
                            destination = chain_b,
                            profit_pct = opp.profit_pct,
                            "Found arbitrage"
                        );
                        opportunities.push(opp);
                    }
                    None => debug!(source = chain_a, destination = chain_b, "No arbitrage"),
                }
            }
        }

        Ok(opportunities)
    }

    /// Re-price an opportunity immediately before committing funds.
    ///
    /// Returns the refreshed record if it still clears the threshold.
    pub fn revalidate<F>(
        &self,
        opportunity: &ArbitrageOpportunity,
        price_fn: F,
    ) -> Result<Option<ArbitrageOpportunity>>
    where
        F: Fn(ChainId, Address) -> Result<U256>,
    {
        let price_a = price_fn(opportunity.source_chain, opportunity.asset)?;
        let price_b = price_fn(opportunity.destination_chain, opportunity.asset)?;
        Ok(self.evaluate(
            opportunity.source_chain,
            opportunity.destination_chain,
            opportunity.asset,
            price_a,
            price_b,
        ))
    }

    fn evaluate(
        &self,
        source_chain: ChainId,
        destination_chain: ChainId,
        asset: Address,
        price_source: U256,
        price_destination: U256,
    ) -> Option<ArbitrageOpportunity> {
        let profit_pct = profit_pct(price_source, price_destination)?;
        (profit_pct > self.min_profit_pct).then_some(ArbitrageOpportunity {
            source_chain,
            destination_chain,
            asset,
            price_source,
            price_destination,
            profit_pct,
        })
    }
}

/// `floor((b - a) * 100 / a)` for b > a. `None` when there is no positive
/// gap or `a` is zero.
fn profit_pct(price_a: U256, price_b: U256) -> Option<u64> {
    if price_a.is_zero() || price_b <= price_a {
        return None;
    }
    let pct = (price_b - price_a).saturating_mul(U256::from(100u64)) / price_a;
    Some(u64::try_from(pct).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
