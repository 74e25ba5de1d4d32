//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the file named by `CAPWATCH_CONFIG`) and
//! deserializes into strongly-typed structs. Secrets (the Telegram bot
//! token) are referenced by env-var name in the config and resolved at
//! runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::orchestrator::{PartialPricePolicy, RunSettings, DEFAULT_SUPPLY};
use crate::sources::{jupiter, solana_rpc};
use crate::storage::DEFAULT_STATE_FILE;
use crate::types::CapwatchError;

/// Default config path when `CAPWATCH_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub holdings: HoldingsConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    pub name: String,
    /// Wallet public key whose holdings are watched.
    pub owner: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Directory for the CSV reports. Exports are skipped when unset.
    #[serde(default)]
    pub export_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HoldingsConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_price_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fixed supply multiplied by the unit price to get market cap.
    #[serde(default = "default_supply")]
    pub supply: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub on_batch_failure: PartialPricePolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

fn default_interval_secs() -> u64 {
    3600
}
fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}
fn default_rpc_url() -> String {
    solana_rpc::DEFAULT_RPC_URL.to_string()
}
fn default_price_url() -> String {
    jupiter::DEFAULT_BASE_URL.to_string()
}
fn default_batch_size() -> usize {
    jupiter::DEFAULT_BATCH_SIZE
}
fn default_supply() -> f64 {
    DEFAULT_SUPPLY
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for HoldingsConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_url: default_price_url(),
            batch_size: default_batch_size(),
            supply: default_supply(),
            timeout_secs: default_timeout_secs(),
            on_batch_failure: PartialPricePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Path from `CAPWATCH_CONFIG`, falling back to `config.toml`.
    pub fn default_path() -> String {
        std::env::var("CAPWATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.watcher.owner.trim().is_empty() {
            return Err(CapwatchError::Config("watcher.owner must be set".into()).into());
        }
        if self.watcher.interval_secs == 0 {
            return Err(CapwatchError::Config("watcher.interval_secs must be positive".into()).into());
        }
        if !(self.pricing.supply.is_finite() && self.pricing.supply > 0.0) {
            return Err(CapwatchError::Config("pricing.supply must be a positive number".into()).into());
        }
        if self.pricing.batch_size == 0 {
            return Err(CapwatchError::Config("pricing.batch_size must be positive".into()).into());
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.watcher.interval_secs)
    }

    /// Engine settings derived from the `[pricing]` section.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            batch_size: self.pricing.batch_size,
            supply: self.pricing.supply,
            request_timeout: Duration::from_secs(self.pricing.timeout_secs),
            holdings_timeout: Duration::from_secs(self.holdings.timeout_secs),
            on_batch_failure: self.pricing.on_batch_failure,
        }
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
