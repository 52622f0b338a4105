//! In-memory fixtures shared by unit and integration tests.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for `tests/`.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::chain::ChainClient;
use crate::types::ChainId;

/// Deterministic `ChainClient` whose answers are set from test code.
pub struct MockChain {
    reported_id: ChainId,
    balance: Mutex<U256>,
    gas_price: Mutex<U256>,
    delay: Mutex<Option<Duration>>,
    /// If set, every query returns this error.
    force_error: Mutex<Option<String>>,
}

impl MockChain {
    pub fn new(reported_id: ChainId) -> Self {
        Self {
            reported_id,
            balance: Mutex::new(U256::ZERO),
            gas_price: Mutex::new(U256::ZERO),
            delay: Mutex::new(None),
            force_error: Mutex::new(None),
        }
    }

    pub fn arc(reported_id: ChainId) -> Arc<Self> {
        Arc::new(Self::new(reported_id))
    }

    pub fn with_balance(self, wei: u64) -> Self {
        self.set_balance(wei);
        self
    }

    pub fn with_gas_price(self, wei: u64) -> Self {
        self.set_gas_price(wei);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn reported_id(&self) -> ChainId {
        self.reported_id
    }

    pub fn set_balance(&self, wei: u64) {
        *self.balance.lock().unwrap() = U256::from(wei);
    }

    pub fn set_gas_price(&self, wei: u64) {
        *self.gas_price.lock().unwrap() = U256::from(wei);
    }

    /// Delay every later query, including `chain_id`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_all(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    async fn gate(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match self.force_error.lock().unwrap().clone() {
            Some(msg) => Err(anyhow!(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<ChainId> {
        self.gate().await?;
        Ok(self.reported_id)
    }

    async fn balance_of(&self, _address: Address) -> Result<U256> {
        self.gate().await?;
        Ok(*self.balance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<U256> {
        self.gate().await?;
        Ok(*self.gas_price.lock().unwrap())
    }
}

/// Runs `f` with temporary environment variable overrides under a
/// process-wide lock so config tests don't race each other.
pub fn with_locked_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
        .collect();

    for (name, value) in vars {
        match value {
            Some(v) => std::env::set_var(name, v),
            None => std::env::remove_var(name),
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (name, value) in previous {
        match value {
            Some(v) => std::env::set_var(&name, v),
            None => std::env::remove_var(&name),
        }
    }

    match result {
        Ok(output) => output,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
