//! Shared types for the CAPWATCH service.
//!
//! These types form the data model used across all modules. Sources,
//! engine and storage all speak in terms of `TokenId`, `CapMap` and
//! `Bracket`, so none of them depend on each other directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Core aliases
// ---------------------------------------------------------------------------

/// Opaque identifier of a fungible token (a mint address in practice).
pub type TokenId = String;

/// Market capitalisation in USD: `price × supply`.
pub type MarketCap = f64;

/// Token → market cap mapping. Also the persisted snapshot shape.
pub type CapMap = BTreeMap<TokenId, MarketCap>;

// ---------------------------------------------------------------------------
// Bracket
// ---------------------------------------------------------------------------

/// Market-cap bracket. Variants are declared in ascending order.
///
/// The labels are the wire/notification format and intentionally lag the
/// bounds by one step (e.g. `0-100k` covers `[100k, 500k)`); the top label
/// also absorbs everything at or above 20M.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bracket {
    #[serde(rename = "unbonded-bonded")]
    UnbondedBonded,
    #[serde(rename = "0-100k")]
    ZeroTo100k,
    #[serde(rename = "100k-500k")]
    HundredKTo500k,
    #[serde(rename = "500k-1M")]
    FiveHundredKTo1M,
    #[serde(rename = "1M-3M")]
    OneMTo3M,
    #[serde(rename = "3M-10M")]
    ThreeMTo10M,
    #[serde(rename = "10M-20M")]
    TenMTo20M,
}

impl Bracket {
    /// Every bracket, lowest first.
    pub const ALL: [Bracket; 7] = [
        Bracket::UnbondedBonded,
        Bracket::ZeroTo100k,
        Bracket::HundredKTo500k,
        Bracket::FiveHundredKTo1M,
        Bracket::OneMTo3M,
        Bracket::ThreeMTo10M,
        Bracket::TenMTo20M,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Bracket::UnbondedBonded => "unbonded-bonded",
            Bracket::ZeroTo100k => "0-100k",
            Bracket::HundredKTo500k => "100k-500k",
            Bracket::FiveHundredKTo1M => "500k-1M",
            Bracket::OneMTo3M => "1M-3M",
            Bracket::ThreeMTo10M => "3M-10M",
            Bracket::TenMTo20M => "10M-20M",
        }
    }

    /// Inclusive lower bound of the market caps classified into this bracket.
    pub fn lower_bound(&self) -> MarketCap {
        match self {
            Bracket::UnbondedBonded => 0.0,
            Bracket::ZeroTo100k => 100_000.0,
            Bracket::HundredKTo500k => 500_000.0,
            Bracket::FiveHundredKTo1M => 1_000_000.0,
            Bracket::OneMTo3M => 3_000_000.0,
            Bracket::ThreeMTo10M => 10_000_000.0,
            Bracket::TenMTo20M => 20_000_000.0,
        }
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Bracket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bracket::ALL
            .iter()
            .find(|b| b.label() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown bracket label: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Transition events
// ---------------------------------------------------------------------------

/// A reportable change: a token crossed a bracket boundary or was priced
/// for the first time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub token: TokenId,
    pub bracket: Bracket,
    pub market_cap: MarketCap,
    /// Bracket of the previous run's cap. `None` for first-seen tokens.
    pub previous: Option<Bracket>,
}

impl TransitionEvent {
    pub fn is_new_token(&self) -> bool {
        self.previous.is_none()
    }

    /// True when the token moved to a higher bracket.
    pub fn is_upgrade(&self) -> bool {
        self.previous.map_or(false, |p| self.bracket > p)
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.previous {
            Some(prev) => write!(
                f,
                "{} {} -> {} (mcap ${:.0})",
                self.token, prev, self.bracket, self.market_cap
            ),
            None => write!(
                f,
                "{} new -> {} (mcap ${:.0})",
                self.token, self.bracket, self.market_cap
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

/// The priced/unpriced partition of one run's holdings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    /// Tokens with a resolvable market cap. Becomes the next snapshot.
    pub priced: CapMap,
    /// Held tokens with no usable price this run.
    pub unpriced: Vec<TokenId>,
}

impl Valuation {
    /// Priced tokens ordered by descending market cap, ties by token id.
    pub fn ranked(&self) -> Vec<(&TokenId, MarketCap)> {
        let mut rows: Vec<(&TokenId, MarketCap)> =
            self.priced.iter().map(|(t, c)| (t, *c)).collect();
        rows.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(b.0),
            other => other,
        });
        rows
    }

    pub fn held(&self) -> usize {
        self.priced.len() + self.unpriced.len()
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary of a complete load→fetch→detect→notify→save cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub held: usize,
    pub priced: usize,
    pub unpriced: usize,
    pub price_batches: usize,
    pub failed_batches: usize,
    pub events: Vec<TransitionEvent>,
    pub notified: usize,
    pub notify_failures: usize,
    pub snapshot_saved: bool,
}

impl RunReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "held={} priced={} unpriced={} batches={}/{} failed | events={} notified={} failed_notify={} | saved={}",
            self.held,
            self.priced,
            self.unpriced,
            self.failed_batches,
            self.price_batches,
            self.events.len(),
            self.notified,
            self.notify_failures,
            self.snapshot_saved,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CAPWATCH.
///
/// Most functions return `anyhow::Result`; these variants are raised where
/// a caller needs to tell the failure apart (via `downcast_ref`).
#[derive(Debug, thiserror::Error)]
pub enum CapwatchError {
    #[error("Snapshot at {path} is corrupt: {reason}")]
    CorruptSnapshot { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Holdings source error: {0}")]
    Holdings(String),

    #[error("Price fetch incomplete: {failed_batches} of {batches} batches failed")]
    IncompletePricing { failed_batches: usize, batches: usize },

    #[error("Notifier error ({notifier}): {message}")]
    Notify { notifier: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
