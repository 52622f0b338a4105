//! Execution collaborators and registry setup for integration testing.
//!
//! Chains are `sentinel::test_support::MockChain`; the quoter and
//! submitter here answer from test code with no network access.

use alloy_primitives::{Address, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use sentinel::chain::ChainRegistry;
use sentinel::execution::{SubmitRequest, SwapQuote, SwapQuoter, TxHash, TxSubmitter};
use sentinel::test_support::MockChain;
use sentinel::types::{ChainDescriptor, ChainId};

fn mock(chain_id: ChainId, balance: u64, gas_price: u64) -> Arc<MockChain> {
    Arc::new(MockChain::new(chain_id).with_balance(balance).with_gas_price(gas_price))
}

/// Registry with Ethereum, Polygon and Base mocks, returned alongside the
/// mocks so tests can move them.
pub async fn three_chain_registry() -> (Arc<ChainRegistry>, Vec<Arc<MockChain>>) {
    let registry = Arc::new(ChainRegistry::new());
    let mocks = vec![mock(1, 4, 30), mock(137, 10, 50), mock(8453, 2, 1)];
    let names = ["Ethereum", "Polygon", "Base"];
    for (mock, name) in mocks.iter().zip(names) {
        registry
            .register_with(ChainDescriptor::sample(mock.reported_id(), name), mock.clone())
            .await
            .unwrap();
    }
    (registry, mocks)
}

/// Always answers with the placeholder quote.
pub struct FixedQuoter;

#[async_trait]
impl SwapQuoter for FixedQuoter {
    async fn quote(
        &self,
        _chain_id: ChainId,
        _token_in: Address,
        _token_out: Address,
        _amount: U256,
    ) -> Result<SwapQuote> {
        Ok(SwapQuote::fallback())
    }
}

/// Records every submission and returns sequential hashes.
#[derive(Default)]
pub struct RecordingSubmitter {
    requests: Mutex<Vec<SubmitRequest>>,
    force_error: Mutex<Option<String>>,
}

impl RecordingSubmitter {
    pub fn requests(&self) -> Vec<SubmitRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl TxSubmitter for RecordingSubmitter {
    async fn submit(&self, request: SubmitRequest) -> Result<TxHash> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        Ok(B256::with_last_byte(requests.len() as u8))
    }

    fn name(&self) -> &str {
        "recording"
    }
}
