//! Ethereum JSON-RPC client over HTTP.
//!
//! Only the three read methods the coordinator needs are implemented:
//! `eth_chainId`, `eth_getBalance` and `eth_gasPrice`. Quantities come
//! back as 0x-prefixed hex and are decoded into `U256`.

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::ChainClient;
use crate::types::ChainId;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-request HTTP timeout. The fan-out applies its own (shorter) bound
/// on top of this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// JSON-RPC connection to a single network endpoint.
pub struct RpcClient {
    http: Client,
    url: String,
}

impl RpcClient {
    /// Create a client for `url`. No request is made until the first call.
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("SENTINEL/0.1.0 (multi-chain-agent)")
            .build()
            .context("Failed to build HTTP client for JSON-RPC")?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        debug!(url = %self.url, method, "JSON-RPC request");

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{method} HTTP error {status}: {text}");
        }

        let value: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} response JSON"))?;

        extract_result(method, value)
    }

    async fn call_quantity(&self, method: &str, params: Value) -> Result<U256> {
        let result = self.call(method, params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| anyhow!("{method} result was not a string"))?;
        parse_hex_quantity(raw).with_context(|| format!("Invalid {method} result"))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> Result<ChainId> {
        let id = self.call_quantity("eth_chainId", json!([])).await?;
        u64::try_from(id).map_err(|_| anyhow!("eth_chainId result does not fit in u64: {id}"))
    }

    async fn balance_of(&self, address: Address) -> Result<U256> {
        self.call_quantity("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn gas_price(&self) -> Result<U256> {
        self.call_quantity("eth_gasPrice", json!([])).await
    }
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// Pull `result` out of a JSON-RPC envelope, surfacing `error` objects.
fn extract_result(method: &str, mut value: Value) -> Result<Value> {
    if let Some(error) = value.get("error") {
        anyhow::bail!("RPC returned error for {method}: {error}");
    }
    value
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| anyhow!("{method} result was missing"))
}

/// Decode a 0x-prefixed hex quantity. `"0x"` decodes to zero.
fn parse_hex_quantity(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("quantity must be 0x-prefixed hex: {trimmed}"))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if digits.len() > 64 {
        anyhow::bail!("quantity exceeds 32 bytes: {trimmed}");
    }
    U256::from_str_radix(digits, 16).map_err(|e| anyhow!("invalid hex quantity {trimmed}: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
