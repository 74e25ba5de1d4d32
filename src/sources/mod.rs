//! External data sources.
//!
//! Defines the `HoldingsSource` and `PriceSource` traits and provides
//! implementations for:
//! - Solana JSON-RPC: token accounts held by a wallet
//! - Jupiter price API: USD quotes for SPL mints

pub mod jupiter;
pub mod solana_rpc;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::TokenId;

/// Abstraction over wallet holdings lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    /// Tokens held by `owner` with a strictly positive balance.
    async fn list_held_tokens(&self, owner: &str) -> Result<Vec<TokenId>>;
}

/// Abstraction over price quote services.
///
/// Implementors return a USD price for each id they could resolve. Ids
/// missing from the returned map are treated as unpriced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch prices for one batch. Callers keep `ids.len()` at or below
    /// `max_batch_size()`.
    async fn fetch_prices(&self, ids: &[TokenId]) -> Result<HashMap<TokenId, f64>>;

    /// Largest id list the upstream accepts in a single request.
    fn max_batch_size(&self) -> usize;
}
