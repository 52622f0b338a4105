//! Chain registry.
//!
//! Owns the set of supported network descriptors and exactly one verified
//! connection handle per network. A chain is only visible to readers once
//! its self-reported chain id has been checked against configuration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use tracing::{info, warn};

use super::rpc::RpcClient;
use super::ChainClient;
use crate::engine::FanOut;
use crate::types::{ChainDescriptor, ChainId, SentinelError};

/// A descriptor paired with its verified connection.
struct ChainEntry {
    descriptor: ChainDescriptor,
    client: Arc<dyn ChainClient>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ChainId, ChainEntry>,
    /// Registration order, kept so "first seen" tie-breaks are stable.
    order: Vec<ChainId>,
}

/// Registry of verified chain connections.
///
/// Registration is append-only per key; lookups may run concurrently with
/// registration of other chains.
#[derive(Default)]
pub struct ChainRegistry {
    inner: RwLock<Inner>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a JSON-RPC connection to the descriptor's endpoint and register
    /// it after verifying the network identity.
    pub async fn register(&self, descriptor: ChainDescriptor) -> Result<()> {
        let client = RpcClient::new(&descriptor.rpc_url).map_err(|e| {
            SentinelError::TransientQueryFailure {
                chain_id: descriptor.chain_id,
                message: format!("failed to connect to {}: {e:#}", descriptor.name),
            }
        })?;
        self.register_with(descriptor, Arc::new(client)).await
    }

    /// Register a chain using an already-opened connection.
    ///
    /// Fails with `ChainIdentityMismatch` if the network reports a
    /// different chain id; the chain is not added on any failure.
    pub async fn register_with(
        &self,
        descriptor: ChainDescriptor,
        client: Arc<dyn ChainClient>,
    ) -> Result<()> {
        if self.contains(descriptor.chain_id) {
            return Err(SentinelError::DuplicateChain(descriptor.chain_id).into());
        }
        verify(&descriptor, client.as_ref()).await?;
        self.insert(descriptor, client)
    }

    /// Register every descriptor independently, opening RPC connections.
    /// See [`register_all_with`](Self::register_all_with).
    pub async fn register_all(
        &self,
        fanout: &FanOut,
        descriptors: Vec<ChainDescriptor>,
    ) -> Vec<(ChainId, Result<()>)> {
        self.register_all_with(fanout, descriptors, |descriptor| {
            let client = RpcClient::new(&descriptor.rpc_url).map_err(|e| {
                SentinelError::TransientQueryFailure {
                    chain_id: descriptor.chain_id,
                    message: format!("failed to connect to {}: {e:#}", descriptor.name),
                }
            })?;
            Ok(Arc::new(client) as Arc<dyn ChainClient>)
        })
        .await
    }

    /// Connect and verify every descriptor concurrently through `fanout`,
    /// then add the verified ones in input order.
    ///
    /// Partial success is the expected steady state; each outcome is logged
    /// and returned in input order. A verification that exceeds the fan-out
    /// timeout counts as a failure.
    pub async fn register_all_with<C>(
        &self,
        fanout: &FanOut,
        descriptors: Vec<ChainDescriptor>,
        connect: C,
    ) -> Vec<(ChainId, Result<()>)>
    where
        C: Fn(&ChainDescriptor) -> Result<Arc<dyn ChainClient>>,
    {
        // First descriptor wins for a repeated id; the repeat fails on insert.
        let by_id: HashMap<ChainId, &ChainDescriptor> =
            descriptors.iter().rev().map(|d| (d.chain_id, d)).collect();

        let verified = fanout
            .run(descriptors.iter().map(|d| d.chain_id), |chain_id| {
                let opened = by_id
                    .get(&chain_id)
                    .ok_or_else(|| anyhow::Error::from(SentinelError::UnknownChain(chain_id)))
                    .and_then(|d| Ok(((*d).clone(), connect(*d)?)));
                async move {
                    let (descriptor, client) = opened?;
                    verify(&descriptor, client.as_ref()).await?;
                    Ok(client)
                }
            })
            .await;

        descriptors
            .into_iter()
            .zip(verified)
            .map(|(descriptor, (chain_id, outcome))| {
                let name = descriptor.name.clone();
                let result = outcome
                    .into_result()
                    .and_then(|client| self.insert(descriptor, client));
                match &result {
                    Ok(()) => info!(chain_id, chain = %name, "Added chain"),
                    Err(e) => warn!(chain_id, chain = %name, error = %e, "Failed to add chain"),
                }
                (chain_id, result)
            })
            .collect()
    }

    fn insert(&self, descriptor: ChainDescriptor, client: Arc<dyn ChainClient>) -> Result<()> {
        let chain_id = descriptor.chain_id;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock: another task may have won the race.
        if inner.entries.contains_key(&chain_id) {
            return Err(SentinelError::DuplicateChain(chain_id).into());
        }
        inner.order.push(chain_id);
        inner.entries.insert(chain_id, ChainEntry { descriptor, client });
        Ok(())
    }

    /// Descriptor for a registered chain.
    pub fn lookup(&self, chain_id: ChainId) -> Result<ChainDescriptor, SentinelError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(&chain_id)
            .map(|e| e.descriptor.clone())
            .ok_or(SentinelError::UnknownChain(chain_id))
    }

    /// Connection handle for a registered chain.
    pub fn connection(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>, SentinelError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(&chain_id)
            .map(|e| Arc::clone(&e.client))
            .ok_or(SentinelError::UnknownChain(chain_id))
    }

    /// Snapshot of all registered descriptors, in registration order.
    pub fn all(&self) -> Vec<ChainDescriptor> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Snapshot of descriptors paired with their handles, in registration order.
    pub fn connections(&self) -> Vec<(ChainDescriptor, Arc<dyn ChainClient>)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| (e.descriptor.clone(), Arc::clone(&e.client)))
            .collect()
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.order.clone()
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(&chain_id)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check the network reports the configured chain id.
async fn verify(descriptor: &ChainDescriptor, client: &dyn ChainClient) -> Result<()> {
    let expected = descriptor.chain_id;
    let actual = client.chain_id().await.map_err(|e| {
        SentinelError::TransientQueryFailure {
            chain_id: expected,
            message: format!("failed to verify chain ID for {}: {e:#}", descriptor.name),
        }
    })?;

    if actual != expected {
        return Err(SentinelError::ChainIdentityMismatch {
            name: descriptor.name.clone(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
