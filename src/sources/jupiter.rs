//! Jupiter price API integration.
//!
//! API: `GET https://api.jup.ag/price/v2?ids=<mint>,<mint>,...`
//! Auth: none for the public tier.
//! Limits: at most 100 ids per request; we stay at 99.
//!
//! Response shape: `{ "data": { "<mint>": { "id": "...", "price": "1.23" } | null } }`.
//! Prices arrive as strings on v2 and as numbers on some mirrors, so both
//! are accepted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::PriceSource;
use crate::types::TokenId;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.jup.ag/price/v2";

/// Ids per request accepted by the upstream list parameter.
pub const DEFAULT_BATCH_SIZE: usize = 99;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    price: Option<PriceValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Number(f64),
    Text(String),
}

impl PriceValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            PriceValue::Number(n) => Some(*n),
            PriceValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Jupiter price client.
pub struct JupiterPriceClient {
    http: Client,
    base_url: String,
    batch_size: usize,
}

impl JupiterPriceClient {
    pub fn new(base_url: Option<String>, batch_size: usize, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("CAPWATCH/0.1.0")
            .build()
            .context("Failed to build HTTP client for Jupiter")?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            batch_size: batch_size.max(1),
        })
    }

    fn request_url(&self, ids: &[TokenId]) -> String {
        let joined: Vec<String> = ids.iter().map(|id| urlencoding::encode(id).into_owned()).collect();
        format!("{}?ids={}", self.base_url.trim_end_matches('/'), joined.join(","))
    }

    /// Extract usable prices from a parsed response. Null entries, missing
    /// prices and unparsable values are dropped.
    fn parse_prices(resp: PriceResponse) -> HashMap<TokenId, f64> {
        resp.data
            .into_iter()
            .filter_map(|(id, entry)| {
                let price = entry?.price?.as_f64()?;
                Some((id, price))
            })
            .collect()
    }
}

#[async_trait]
impl PriceSource for JupiterPriceClient {
    async fn fetch_prices(&self, ids: &[TokenId]) -> Result<HashMap<TokenId, f64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if ids.len() > self.batch_size {
            warn!(
                requested = ids.len(),
                limit = self.batch_size,
                "Price batch exceeds configured limit"
            );
        }

        let url = self.request_url(ids);
        debug!(count = ids.len(), "Fetching Jupiter prices");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Jupiter price request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter API error {status}: {body}");
        }

        let parsed: PriceResponse = resp
            .json()
            .await
            .context("Failed to parse Jupiter price response")?;

        let prices = Self::parse_prices(parsed);
        debug!(requested = ids.len(), priced = prices.len(), "Jupiter prices received");
        Ok(prices)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
