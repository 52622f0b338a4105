//! Swap quotes from a DEX aggregator.
//!
//! `AggregatorQuoter` talks to an OKX-style aggregator
//! (`GET {base}/swap?chainId=&tokenIn=&tokenOut=&amount=`). Any failure
//! (transport, HTTP error status, non-"0" response code, unparseable body)
//! produces the placeholder fallback quote instead of an error. Quotes are
//! unauthenticated; nothing here checks that the calldata does what the
//! price claims.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, U256};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ChainDescriptor, ChainId};

/// Aggregator used for chains without their own endpoint.
pub const DEFAULT_AGGREGATOR_URL: &str = "https://www.okx.com/api/v5/dex/aggregator";

const FALLBACK_TARGET: Address = address!("1234567890abcdef1234567890abcdef12345678");

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A quoted swap: the contract to call and the calldata to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapQuote {
    pub price: Decimal,
    pub target: Address,
    pub call_data: Bytes,
    /// True when this is the placeholder returned on aggregator failure.
    pub fallback: bool,
}

impl SwapQuote {
    /// Placeholder quote used whenever the aggregator cannot be read.
    pub fn fallback() -> Self {
        Self {
            price: dec!(0.1),
            target: FALLBACK_TARGET,
            call_data: Bytes::new(),
            fallback: true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapQuoter: Send + Sync {
    async fn quote(
        &self,
        chain_id: ChainId,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<SwapQuote>;
}

// ---------------------------------------------------------------------------
// Aggregator client
// ---------------------------------------------------------------------------

pub struct AggregatorQuoter {
    http: Client,
    default_url: String,
    endpoints: HashMap<ChainId, String>,
}

impl AggregatorQuoter {
    pub fn new(default_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("SENTINEL/0.1.0 (multi-chain-agent)")
            .build()
            .context("Failed to build HTTP client for aggregator")?;

        Ok(Self {
            http,
            default_url: default_url.trim_end_matches('/').to_string(),
            endpoints: HashMap::new(),
        })
    }

    /// Use each descriptor's own aggregator endpoint for its chain.
    pub fn with_endpoints<'a>(mut self, chains: impl IntoIterator<Item = &'a ChainDescriptor>) -> Self {
        for chain in chains {
            self.endpoints.insert(
                chain.chain_id,
                chain.aggregator_url.trim_end_matches('/').to_string(),
            );
        }
        self
    }

    /// Full request URL for a quote.
    pub fn quote_url(&self, chain_id: ChainId, token_in: Address, token_out: Address, amount: U256) -> String {
        let base = self.endpoints.get(&chain_id).unwrap_or(&self.default_url);
        format!(
            "{base}/swap?chainId={chain_id}&tokenIn={}&tokenOut={}&amount={}",
            urlencoding::encode(&token_in.to_checksum(None)),
            urlencoding::encode(&token_out.to_checksum(None)),
            amount,
        )
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("Aggregator request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Aggregator HTTP error {status}: {text}");
        }

        resp.json()
            .await
            .context("Failed to parse aggregator response")
    }
}

#[async_trait]
impl SwapQuoter for AggregatorQuoter {
    async fn quote(
        &self,
        chain_id: ChainId,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<SwapQuote> {
        let url = self.quote_url(chain_id, token_in, token_out, amount);
        debug!(chain_id, %url, "Requesting swap quote");

        let quote = match self.fetch(&url).await {
            Ok(body) => parse_quote_response(&body).unwrap_or_else(|e| {
                warn!(chain_id, error = %e, "Aggregator returned no usable quote, using fallback");
                SwapQuote::fallback()
            }),
            Err(e) => {
                warn!(chain_id, error = %e, "Aggregator unreachable, using fallback quote");
                SwapQuote::fallback()
            }
        };
        Ok(quote)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse an aggregator body of the form
/// `{"code": "0", "data": {...}}` or `{"code": "0", "data": [{...}]}`.
pub fn parse_quote_response(body: &Value) -> Result<SwapQuote> {
    let code = match body.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => "0".to_string(),
    };
    if code != "0" {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or("");
        return Err(anyhow!("aggregator error code {code}: {msg}"));
    }

    let data = match body.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
    .ok_or_else(|| anyhow!("response has no data"))?;

    let price = match data.get("price") {
        Some(Value::String(s)) => Decimal::from_str(s).context("Invalid price")?,
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).context("Invalid price")?,
        _ => return Err(anyhow!("response has no price")),
    };

    let target = data
        .get("to")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("response has no target"))?
        .parse::<Address>()
        .context("Invalid target address")?;

    let raw = data.get("data").and_then(Value::as_str).unwrap_or("0x");
    let call_data = hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .context("Invalid calldata")?;

    Ok(SwapQuote {
        price,
        target,
        call_data,
        fallback: false,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
