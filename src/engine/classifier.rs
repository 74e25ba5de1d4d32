//! Market-cap → bracket classification.
//!
//! Thresholds are evaluated low-to-high with an early return; the last
//! arm is a catch-all, so anything at or above 20M lands in `10M-20M`.

use crate::types::{Bracket, MarketCap};

/// Upper bounds (exclusive), ascending, paired with the bracket they close.
const THRESHOLDS: &[(MarketCap, Bracket)] = &[
    (100_000.0, Bracket::UnbondedBonded),
    (500_000.0, Bracket::ZeroTo100k),
    (1_000_000.0, Bracket::HundredKTo500k),
    (3_000_000.0, Bracket::FiveHundredKTo1M),
    (10_000_000.0, Bracket::OneMTo3M),
    (20_000_000.0, Bracket::ThreeMTo10M),
];

/// Classify a market cap into its bracket. Total and pure.
pub fn classify(market_cap: MarketCap) -> Bracket {
    for &(upper, bracket) in THRESHOLDS {
        if market_cap < upper {
            return bracket;
        }
    }
    Bracket::TenMTo20M
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
