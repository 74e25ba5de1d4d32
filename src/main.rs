//! CAPWATCH: wallet market-cap bracket watcher
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the RPC, price, notifier and snapshot collaborators into the
//! orchestrator, and runs the hourly schedule until Ctrl+C.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use capwatch::alerts::console::ConsoleNotifier;
use capwatch::alerts::telegram::TelegramNotifier;
use capwatch::alerts::Notifier;
use capwatch::config::{AlertsConfig, AppConfig};
use capwatch::engine::orchestrator::Orchestrator;
use capwatch::engine::scheduler::Scheduler;
use capwatch::export::Exporter;
use capwatch::sources::jupiter::JupiterPriceClient;
use capwatch::sources::solana_rpc::SolanaRpcHoldings;
use capwatch::storage::JsonSnapshotStore;

const BANNER: &str = r#"
   ___   _   ___ __      ___ _____ ___ _  _
  / __| /_\ | _ \\ \    / /_\_   _/ __| || |
 | (__ / _ \|  _/ \ \/\/ / _ \| || (__| __ |
  \___/_/ \_\_|    \_/\_/_/ \_\_| \___|_||_|

  Market-cap bracket watcher
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::default_path();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.watcher.name,
        owner = %cfg.watcher.owner,
        interval_secs = cfg.watcher.interval_secs,
        state_file = %cfg.watcher.state_file,
        on_batch_failure = ?cfg.pricing.on_batch_failure,
        "CAPWATCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let holdings = SolanaRpcHoldings::new(
        Some(cfg.holdings.rpc_url.clone()),
        Duration::from_secs(cfg.holdings.timeout_secs),
    )?;

    let prices = JupiterPriceClient::new(
        Some(cfg.pricing.base_url.clone()),
        cfg.pricing.batch_size,
        Duration::from_secs(cfg.pricing.timeout_secs),
    )?;

    let notifier = build_notifier(&cfg.alerts, Duration::from_secs(cfg.pricing.timeout_secs))?;
    let store = JsonSnapshotStore::new(&cfg.watcher.state_file);

    let mut orchestrator = Orchestrator::new(
        cfg.watcher.owner.clone(),
        Arc::new(holdings),
        Arc::new(prices),
        notifier,
        Arc::new(store),
        cfg.run_settings(),
    );
    if let Some(dir) = &cfg.watcher.export_dir {
        info!(dir = %dir, "CSV exports enabled");
        orchestrator = orchestrator.with_exporter(Exporter::new(dir));
    }

    // -- Main loop -------------------------------------------------------

    info!(
        interval_secs = cfg.watcher.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let scheduler = Scheduler::new(Arc::new(orchestrator), cfg.interval());
    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("CAPWATCH shut down cleanly.");
    Ok(())
}

/// Telegram when both env vars resolve, otherwise log-only.
fn build_notifier(alerts: &AlertsConfig, timeout: Duration) -> Result<Arc<dyn Notifier>> {
    let token = alerts
        .telegram_bot_token_env
        .as_deref()
        .and_then(|env| AppConfig::resolve_env(env).ok());
    let chat_id = alerts
        .telegram_chat_id_env
        .as_deref()
        .and_then(|env| AppConfig::resolve_env(env).ok());

    match (token, chat_id) {
        (Some(token), Some(chat_id)) => {
            info!(chat_id = %chat_id, "Using Telegram notifier");
            Ok(Arc::new(TelegramNotifier::new(SecretString::new(token), chat_id, timeout)?))
        }
        _ => {
            warn!("Telegram not configured, transitions will only be logged");
            Ok(Arc::new(ConsoleNotifier))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("capwatch=info"));

    if std::env::var("CAPWATCH_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
