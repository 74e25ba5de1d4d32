//! Run orchestrator: one load, fetch, detect, notify, save cycle.
//!
//! Every collaborator is injected, so tests swap in fakes for the wallet,
//! the price API, the notifier and the snapshot file.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::detector::detect;
use super::pricing::{fetch_prices, PriceFetch};
use crate::alerts::Notifier;
use crate::export::Exporter;
use crate::sources::{HoldingsSource, PriceSource};
use crate::storage::SnapshotStore;
use crate::types::{CapwatchError, RunReport, TokenId, Valuation};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Fixed token supply used to turn a unit price into a market cap.
pub const DEFAULT_SUPPLY: f64 = 1_000_000_000.0;

/// What to do when some price batches fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPricePolicy {
    /// Treat failed batches' tokens as unpriced and carry on.
    #[default]
    Degrade,
    /// Abort before detection; nothing is notified or persisted.
    Abort,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub batch_size: usize,
    pub supply: f64,
    /// Bound on each price batch and each notification.
    pub request_timeout: Duration,
    pub holdings_timeout: Duration,
    pub on_batch_failure: PartialPricePolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: crate::sources::jupiter::DEFAULT_BATCH_SIZE,
            supply: DEFAULT_SUPPLY,
            request_timeout: Duration::from_secs(30),
            holdings_timeout: Duration::from_secs(30),
            on_batch_failure: PartialPricePolicy::Degrade,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    owner: String,
    holdings: Arc<dyn HoldingsSource>,
    prices: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SnapshotStore>,
    exporter: Option<Exporter>,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(
        owner: impl Into<String>,
        holdings: Arc<dyn HoldingsSource>,
        prices: Arc<dyn PriceSource>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SnapshotStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            owner: owner.into(),
            holdings,
            prices,
            notifier,
            store,
            exporter: None,
            settings,
        }
    }

    /// Write CSV reports of each run's valuation to `exporter`.
    pub fn with_exporter(mut self, exporter: Exporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute one full cycle.
    ///
    /// Errors abort the cycle without touching the snapshot, except a
    /// failing `save` which is itself the error.
    pub async fn run_once(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(owner = %self.owner, "Starting run");

        // 1. Previous state. Corruption stops us before any network call.
        let previous = self.store.load().context("Failed to load previous snapshot")?;

        // 2. Holdings
        let held = self.held_tokens().await?;
        info!(held = held.len(), "Holdings resolved");

        // 3. Prices
        let fetch = fetch_prices(
            self.prices.as_ref(),
            &held,
            self.settings.batch_size,
            self.settings.request_timeout,
        )
        .await;

        if !fetch.is_complete() && self.settings.on_batch_failure == PartialPricePolicy::Abort {
            error!(
                failed_batches = fetch.failed_batches,
                batches = fetch.batches,
                "Price fetch incomplete, aborting run"
            );
            return Err(CapwatchError::IncompletePricing {
                failed_batches: fetch.failed_batches,
                batches: fetch.batches,
            }
            .into());
        }

        // 4. Partition
        let valuation = value_holdings(&held, &fetch, self.settings.supply);
        info!(
            priced = valuation.priced.len(),
            unpriced = valuation.unpriced.len(),
            failed_batches = fetch.failed_batches,
            "Holdings valued"
        );

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.write(&valuation) {
                warn!(error = %e, "Export failed, continuing");
            }
        }

        // 5. Detect
        let events = detect(&valuation.priced, &previous);

        // 6. Notify (best effort)
        let mut notified = 0;
        let mut notify_failures = 0;
        for event in &events {
            match tokio::time::timeout(self.settings.request_timeout, self.notifier.notify(event)).await {
                Ok(Ok(())) => notified += 1,
                Ok(Err(e)) => {
                    notify_failures += 1;
                    warn!(token = %event.token, error = %e, "Notification failed");
                }
                Err(_) => {
                    notify_failures += 1;
                    warn!(token = %event.token, "Notification timed out");
                }
            }
        }

        // 7. Persist, unconditionally.
        self.store
            .save(&valuation.priced)
            .context("Failed to save snapshot")?;
        debug!(tokens = valuation.priced.len(), "Snapshot replaced");

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            held: held.len(),
            priced: valuation.priced.len(),
            unpriced: valuation.unpriced.len(),
            price_batches: fetch.batches,
            failed_batches: fetch.failed_batches,
            events,
            notified,
            notify_failures,
            snapshot_saved: true,
        })
    }

    /// Held token ids, de-duplicated, in first-seen order.
    async fn held_tokens(&self) -> Result<Vec<TokenId>> {
        let listed = tokio::time::timeout(
            self.settings.holdings_timeout,
            self.holdings.list_held_tokens(&self.owner),
        )
        .await
        .map_err(|_| CapwatchError::Holdings("holdings lookup timed out".into()))?
        .context("Failed to list held tokens")?;

        let mut seen = BTreeSet::new();
        Ok(listed
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }
}

/// Split held tokens into priced and unpriced.
///
/// A token is priced when its price is finite and non-negative; its cap is
/// `price × supply`. Everything else, including tokens whose batch failed,
/// is unpriced.
pub fn value_holdings(held: &[TokenId], fetch: &PriceFetch, supply: f64) -> Valuation {
    let mut valuation = Valuation::default();

    for id in held {
        match fetch.prices.get(id) {
            Some(&price) if price.is_finite() && price >= 0.0 && (price * supply).is_finite() => {
                valuation.priced.insert(id.clone(), price * supply);
            }
            Some(&price) => {
                debug!(token = %id, price, "Discarding unusable price");
                valuation.unpriced.push(id.clone());
            }
            None => valuation.unpriced.push(id.clone()),
        }
    }

    valuation
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
