//! Batched, concurrent price fetching.
//!
//! Splits the held token list into chunks the price source accepts, fires
//! every chunk at once and waits for all of them. A chunk that errors or
//! times out does not fail the whole fetch: its ids are returned in
//! `failed` and the caller decides what that means for the run.

use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::sources::PriceSource;
use crate::types::TokenId;

/// Result of fetching prices for a full token list.
#[derive(Debug, Clone, Default)]
pub struct PriceFetch {
    /// Raw USD prices for ids the source resolved.
    pub prices: HashMap<TokenId, f64>,
    /// Ids whose batch errored or timed out.
    pub failed: Vec<TokenId>,
    pub batches: usize,
    pub failed_batches: usize,
}

impl PriceFetch {
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }
}

/// Fetch prices for `ids` in batches of at most `batch_size`, all batches
/// concurrently, each bounded by `timeout`.
pub async fn fetch_prices(
    source: &dyn PriceSource,
    ids: &[TokenId],
    batch_size: usize,
    timeout: Duration,
) -> PriceFetch {
    let batch_size = batch_size.clamp(1, source.max_batch_size().max(1));
    let chunks: Vec<&[TokenId]> = ids.chunks(batch_size).collect();

    let results = join_all(chunks.iter().enumerate().map(|(idx, chunk)| async move {
        let outcome = tokio::time::timeout(timeout, source.fetch_prices(chunk)).await;
        (idx, *chunk, outcome)
    }))
    .await;

    let mut fetch = PriceFetch {
        batches: chunks.len(),
        ..PriceFetch::default()
    };

    for (idx, chunk, outcome) in results {
        match outcome {
            Ok(Ok(prices)) => {
                debug!(batch = idx, requested = chunk.len(), priced = prices.len(), "Price batch done");
                // Ignore anything the source returned that we did not ask for.
                for id in chunk {
                    if let Some(price) = prices.get(id) {
                        fetch.prices.insert(id.clone(), *price);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(batch = idx, size = chunk.len(), error = %e, "Price batch failed");
                fetch.failed_batches += 1;
                fetch.failed.extend(chunk.iter().cloned());
            }
            Err(_) => {
                warn!(batch = idx, size = chunk.len(), timeout_secs = timeout.as_secs(), "Price batch timed out");
                fetch.failed_batches += 1;
                fetch.failed.extend(chunk.iter().cloned());
            }
        }
    }

    fetch
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
