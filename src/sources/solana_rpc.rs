//! Solana JSON-RPC holdings lookup.
//!
//! Uses `getTokenAccountsByOwner` with `jsonParsed` encoding, once for the
//! SPL Token program and once for Token-2022. Raw amounts are summed per
//! mint across accounts; mints with a zero total are not reported.
//!
//! RPC docs: https://solana.com/docs/rpc/http/gettokenaccountsbyowner

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::HoldingsSource;
use crate::types::{CapwatchError, TokenId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const SPL_TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

// ---------------------------------------------------------------------------
// RPC response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<RpcResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    #[serde(default)]
    value: Vec<KeyedAccount>,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    account: AccountInfo,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    data: AccountData,
}

/// `jsonParsed` data is an object; undecodable accounts come back as a
/// `[base64, "base64"]` pair, which we skip.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountData {
    Parsed { parsed: ParsedAccount },
    Other(#[allow(dead_code)] serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    mint: String,
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    /// Raw integer amount as a decimal string.
    amount: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Holdings source backed by a Solana JSON-RPC endpoint.
pub struct SolanaRpcHoldings {
    http: Client,
    rpc_url: String,
}

impl SolanaRpcHoldings {
    pub fn new(rpc_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("CAPWATCH/0.1.0")
            .build()
            .context("Failed to build HTTP client for Solana RPC")?;

        Ok(Self {
            http,
            rpc_url: rpc_url.unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
        })
    }

    /// Fetch token accounts of `owner` under one token program.
    async fn token_accounts(&self, owner: &str, program_id: &str) -> Result<Vec<KeyedAccount>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTokenAccountsByOwner",
            "params": [
                owner,
                { "programId": program_id },
                { "encoding": "jsonParsed", "commitment": "confirmed" }
            ]
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("Solana RPC request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Solana RPC error {status}: {text}");
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .context("Failed to parse getTokenAccountsByOwner response")?;

        Self::into_accounts(parsed)
    }

    fn into_accounts(resp: RpcResponse) -> Result<Vec<KeyedAccount>> {
        if let Some(err) = resp.error {
            return Err(CapwatchError::Holdings(format!("RPC error {}: {}", err.code, err.message)).into());
        }
        Ok(resp.result.map(|r| r.value).unwrap_or_default())
    }

    /// Sum raw balances per mint and keep mints with a positive total.
    fn positive_mints(accounts: impl IntoIterator<Item = KeyedAccount>) -> Vec<TokenId> {
        let mut totals: BTreeMap<String, u128> = BTreeMap::new();

        for keyed in accounts {
            let AccountData::Parsed { parsed } = keyed.account.data else {
                continue;
            };
            let Ok(amount) = parsed.info.token_amount.amount.parse::<u128>() else {
                debug!(mint = %parsed.info.mint, "Skipping account with unparsable amount");
                continue;
            };
            *totals.entry(parsed.info.mint).or_default() += amount;
        }

        totals
            .into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(mint, _)| mint)
            .collect()
    }
}

#[async_trait]
impl HoldingsSource for SolanaRpcHoldings {
    async fn list_held_tokens(&self, owner: &str) -> Result<Vec<TokenId>> {
        let (spl, spl_2022) = tokio::join!(
            self.token_accounts(owner, SPL_TOKEN_PROGRAM),
            self.token_accounts(owner, SPL_TOKEN_2022_PROGRAM),
        );

        let mut accounts = spl.context("SPL Token account lookup failed")?;
        accounts.extend(spl_2022.context("Token-2022 account lookup failed")?);

        let account_count = accounts.len();
        let mints = Self::positive_mints(accounts);
        info!(accounts = account_count, held = mints.len(), "Token holdings fetched");
        Ok(mints)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
