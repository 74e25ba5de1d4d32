//! Telegram Bot API notifier.
//!
//! API: `POST https://api.telegram.org/bot<token>/sendMessage`
//! Body: `{ chat_id, text, parse_mode: "HTML", disable_web_page_preview }`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use super::{format_event, Notifier};
use crate::types::{CapwatchError, TransitionEvent};

const API_BASE: &str = "https://api.telegram.org";
const NOTIFIER_NAME: &str = "telegram";

pub struct TelegramNotifier {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            bot_token,
            chat_id,
            api_base: API_BASE.to_string(),
        })
    }

    /// Point the client at a different API host (self-hosted Bot API server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token.expose_secret()
        );

        // The URL embeds the bot token; keep it out of error chains.
        let resp = self
            .http
            .post(&url)
            .json(&self.payload(text))
            .send()
            .await
            .map_err(|e| CapwatchError::Notify {
                notifier: NOTIFIER_NAME.into(),
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CapwatchError::Notify {
                notifier: NOTIFIER_NAME.into(),
                message: format!("status {status}: {body}"),
            }
            .into());
        }

        debug!(chat_id = %self.chat_id, "Telegram message sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<()> {
        self.send_message(&format_event(event)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
