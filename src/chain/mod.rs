//! Chain connectivity.
//!
//! Defines the `ChainClient` trait (one live connection handle per
//! network) and provides the JSON-RPC implementation plus the registry
//! that owns verified handles.

pub mod registry;
pub mod rpc;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::types::ChainId;

/// Read-only view of one EVM network.
///
/// Implementors must be cheap to share (`Arc<dyn ChainClient>`); the
/// registry hands the same handle to every component.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The network's self-reported chain identifier.
    async fn chain_id(&self) -> Result<ChainId>;

    /// Native-asset balance of `address` at the latest block.
    async fn balance_of(&self, address: Address) -> Result<U256>;

    /// Currently suggested gas price in wei.
    async fn gas_price(&self) -> Result<U256>;
}

pub use registry::ChainRegistry;
pub use rpc::RpcClient;
