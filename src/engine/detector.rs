//! Change detection between two runs' market-cap mappings.
//!
//! Only tokens present in the current mapping are considered. A token
//! missing from the previous mapping is reported as newly bonded
//! regardless of its cap; a token that disappeared is never reported.

use tracing::debug;

use super::classifier::classify;
use crate::types::{Bracket, CapMap, TransitionEvent};

/// Compare `current` against `previous` and return the notify-worthy
/// transitions, in iteration order of `current`.
///
/// Caps are expected to be finite and non-negative; callers filter
/// anything else out before building the mapping.
pub fn detect(current: &CapMap, previous: &CapMap) -> Vec<TransitionEvent> {
    let mut events = Vec::new();

    for (token, &cap) in current {
        match previous.get(token) {
            None => {
                debug!(token = %token, cap, "New token priced");
                events.push(TransitionEvent {
                    token: token.clone(),
                    bracket: Bracket::UnbondedBonded,
                    market_cap: cap,
                    previous: None,
                });
            }
            Some(&prev_cap) => {
                let now = classify(cap);
                let before = classify(prev_cap);
                if now != before {
                    debug!(token = %token, %before, %now, cap, "Bracket changed");
                    events.push(TransitionEvent {
                        token: token.clone(),
                        bracket: now,
                        market_cap: cap,
                        previous: Some(before),
                    });
                }
            }
        }
    }

    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
