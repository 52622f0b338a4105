//! Shared types for the SENTINEL agent.
//!
//! These types form the data model used across all modules: chain
//! descriptors, balances, arbitrage records, transaction categories and
//! the domain error taxonomy.

use alloy_primitives::{address, Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric chain identifier (EIP-155).
pub type ChainId = u64;

/// Sentinel address used by aggregators and wallets for the native asset.
pub const NATIVE_ASSET: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

// ---------------------------------------------------------------------------
// Chain descriptor
// ---------------------------------------------------------------------------

/// Immutable description of one supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_url: String,
    /// Asset identifier used for the chain's native token balance.
    pub native_asset: Address,
    /// Base URL of the DEX aggregator serving this chain.
    pub aggregator_url: String,
    pub is_testnet: bool,
    /// Average block interval in seconds.
    pub block_time_secs: u64,
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.name, self.chain_id)?;
        if self.is_testnet {
            write!(f, " [testnet]")?;
        }
        Ok(())
    }
}

impl ChainDescriptor {
    /// Helper to build a descriptor for tests with sensible defaults.
    #[cfg(any(test, feature = "test-support"))]
    pub fn sample(chain_id: ChainId, name: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            rpc_url: format!("http://localhost:8545/{chain_id}"),
            native_asset: NATIVE_ASSET,
            aggregator_url: "https://aggregator.example.com".to_string(),
            is_testnet: false,
            block_time_secs: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction categories
// ---------------------------------------------------------------------------

/// Category of a pending transaction, used to pick a reference gas limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxCategory {
    Swap,
    Transfer,
    Approval,
}

impl fmt::Display for TxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxCategory::Swap => write!(f, "swap"),
            TxCategory::Transfer => write!(f, "transfer"),
            TxCategory::Approval => write!(f, "approval"),
        }
    }
}

// ---------------------------------------------------------------------------
// Arbitrage
// ---------------------------------------------------------------------------

/// A price gap between two chains for the same asset.
///
/// Ephemeral: produced and consumed within one scan. Prices may be stale
/// by the time a caller acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrageOpportunity {
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub asset: Address,
    pub price_source: U256,
    pub price_destination: U256,
    /// Whole-percent profit, floored.
    pub profit_pct: u64,
}

impl fmt::Display for ArbitrageOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}: {} vs {}, profit {}%)",
            self.source_chain,
            self.destination_chain,
            self.asset,
            self.price_source,
            self.price_destination,
            self.profit_pct,
        )
    }
}

// ---------------------------------------------------------------------------
// Per-chain warnings
// ---------------------------------------------------------------------------

/// A non-fatal, chain-scoped failure surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChainWarning {
    pub chain_id: ChainId,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for ChainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {}: {}", self.chain_id, self.message)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SENTINEL.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Chain ID mismatch for {name}: expected {expected}, got {actual}")]
    ChainIdentityMismatch {
        name: String,
        expected: ChainId,
        actual: ChainId,
    },

    #[error("Chain {0} not supported")]
    UnknownChain(ChainId),

    #[error("Chain {0} is already registered")]
    DuplicateChain(ChainId),

    #[error("No available chains")]
    NoAvailableChain,

    #[error("Query failed on chain {chain_id}: {message}")]
    TransientQueryFailure { chain_id: ChainId, message: String },

    #[error("Strategy #{strategy_id} execution failed: {message}")]
    StrategyExecutionFailure { strategy_id: u64, message: String },

    #[error("Invalid strategy #{strategy_id}: {message}")]
    InvalidStrategy { strategy_id: u64, message: String },

    #[error("Configuration error: {0}")]
    FatalConfiguration(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
