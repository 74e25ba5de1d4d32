//! Console (structured log) notifier, used when no Telegram chat is configured.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use crate::types::TransitionEvent;

#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<()> {
        info!(
            token = %event.token,
            bracket = %event.bracket,
            previous = ?event.previous.map(|b| b.label()),
            market_cap = format!("${:.0}", event.market_cap),
            "Bracket transition"
        );
        Ok(())
    }
}
