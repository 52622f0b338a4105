//! Transaction submission.
//!
//! Defines the `TxSubmitter` trait the strategies submit swaps through and
//! provides a dry-run implementation. Every swap is routed through the
//! agent's smart account as an `execute(address,bytes)` call wrapping the
//! aggregator's target and calldata.

pub mod quote;

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::ChainId;

pub use quote::{AggregatorQuoter, SwapQuote, SwapQuoter};

/// Hash of a submitted transaction.
pub type TxHash = B256;

/// A call to be executed by the smart account on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub chain_id: ChainId,
    /// Smart account that performs the call.
    pub account: Address,
    /// Contract the account calls (usually the aggregator router).
    pub target: Address,
    pub call_data: Bytes,
}

impl SubmitRequest {
    /// Calldata for the smart account itself.
    pub fn account_call_data(&self) -> Bytes {
        encode_execute_call(self.target, &self.call_data)
    }
}

/// Builds, signs and broadcasts transactions.
///
/// Not idempotent: callers retrying a failed submission must expect a new
/// transaction (and nonce) per attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<TxHash>;

    /// Short name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Logs the call it would have sent and returns a pseudo-hash.
///
/// The hash is `keccak256(chain_id ‖ signer ‖ account ‖ calldata ‖ sequence)`,
/// so it is deterministic for a given signer and submission order.
#[derive(Debug, Default)]
pub struct DryRunSubmitter {
    signer: Address,
    sequence: AtomicU64,
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitter acting as the EOA that owns the smart account.
    pub fn with_signer(signer: Address) -> Self {
        Self {
            signer,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Number of submissions so far.
    pub fn submitted(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSubmitter for DryRunSubmitter {
    async fn submit(&self, request: SubmitRequest) -> Result<TxHash> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let payload = request.account_call_data();

        let mut preimage = Vec::with_capacity(8 + 20 + 20 + payload.len() + 8);
        preimage.extend_from_slice(&request.chain_id.to_be_bytes());
        preimage.extend_from_slice(self.signer.as_slice());
        preimage.extend_from_slice(request.account.as_slice());
        preimage.extend_from_slice(&payload);
        preimage.extend_from_slice(&seq.to_be_bytes());
        let hash = keccak256(&preimage);

        info!(
            chain_id = request.chain_id,
            signer = %self.signer,
            account = %request.account,
            target = %request.target,
            calldata_len = payload.len(),
            tx_hash = %hash,
            "[DRY RUN] Would submit transaction"
        );
        Ok(hash)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

// ---------------------------------------------------------------------------
// ABI encoding
// ---------------------------------------------------------------------------

sol! {
    /// Smart-account entry point wrapping an arbitrary call.
    function execute(address target, bytes data);
}

/// ABI-encode `execute(target, data)` for the smart account.
pub fn encode_execute_call(target: Address, data: &[u8]) -> Bytes {
    executeCall {
        target,
        data: Bytes::copy_from_slice(data),
    }
    .abi_encode()
    .into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
