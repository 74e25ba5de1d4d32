//! Transition notifications.
//!
//! Defines the `Notifier` trait and provides implementations for:
//! - Telegram Bot API (`sendMessage`)
//! - Structured log lines (fallback when no chat is configured)
//!
//! Delivery is best-effort: the orchestrator logs and counts failures but
//! never lets them block snapshot persistence.

pub mod console;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::TransitionEvent;

/// Abstraction over notification sinks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one transition.
    async fn notify(&self, event: &TransitionEvent) -> Result<()>;
}

/// Render a transition as a short HTML message.
pub fn format_event(event: &TransitionEvent) -> String {
    let headline = match event.previous {
        None => "🆕 <b>Newly bonded</b>".to_string(),
        Some(prev) if event.is_upgrade() => format!("📈 <b>{prev} → {}</b>", event.bracket),
        Some(prev) => format!("📉 <b>{prev} → {}</b>", event.bracket),
    };

    format!(
        "{headline}\n\
         🪙 <b>Token:</b> <code>{}</code>\n\
         💰 <b>Market cap:</b> ${}\n\
         🏷 <b>Bracket:</b> {}",
        event.token,
        group_thousands(event.market_cap),
        event.bracket,
    )
}

/// `1234567.8` → `"1,234,568"`.
fn group_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
