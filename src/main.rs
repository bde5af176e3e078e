//! Bullion Desk: chat operator console for gold dealers
//!
//! Entry point. Loads configuration and secrets, initialises structured
//! logging, starts the background rate updater and (optionally) the status
//! dashboard, then runs the supervised chat event loop until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use bullion_desk::bot::telegram::TelegramTransport;
use bullion_desk::bot::{CommandRouter, EventLoop};
use bullion_desk::config::{self, Secrets};
use bullion_desk::dashboard::{self, routes::DashboardState};
use bullion_desk::market::goldapi::GoldApiSource;
use bullion_desk::market::{MarketDataCache, RateUpdater};
use bullion_desk::registry::Registry;
use bullion_desk::session::SessionStore;

const CONFIG_PATH: &str = "desk.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = config::AppConfig::load_or_default(CONFIG_PATH)?;
    let secrets = Secrets::from_env(&cfg)?;

    info!(
        seed_price = cfg.desk.seed_price_usd,
        refresh_secs = cfg.quote.refresh_interval_secs,
        poll_timeout_secs = cfg.transport.poll_timeout_secs,
        secondary_currency = %cfg.desk.secondary_currency.label,
        "Bullion Desk starting up"
    );
    if secrets.spreadsheet_id.is_none() || secrets.service_account.is_none() {
        warn!("Ledger credentials incomplete; trade ledger unavailable");
    }

    // -- Shared state ----------------------------------------------------

    let registry = Arc::new(Registry::builtin());
    let sessions = Arc::new(SessionStore::new(registry.clone()));
    let cache = Arc::new(MarketDataCache::new(cfg.desk.seed_price_usd));
    info!(
        active_dealers = registry.active_dealers().len(),
        customers = registry.customers().len(),
        "Registry loaded"
    );

    // -- Rate updater ----------------------------------------------------

    let source = Arc::new(GoldApiSource::new(
        cfg.quote.url.clone(),
        secrets.quote_api_key,
        Duration::from_secs(cfg.quote.timeout_secs),
    )?);
    // Started by the event loop once its warm-up refresh has run.
    let updater = Arc::new(RateUpdater::new(source, cache.clone(), cfg.updater_timing()));

    // -- Dashboard -------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            cache.clone(),
            sessions.clone(),
            cfg.desk.secondary_currency.clone(),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port);
    }

    // -- Chat loop -------------------------------------------------------

    let timing = cfg.loop_timing();
    let transport = Arc::new(TelegramTransport::new(
        cfg.transport.api_base.clone(),
        secrets.bot_token,
        timing.poll_timeout,
    )?);
    let router = CommandRouter::new(registry, sessions, cache, cfg.desk.secondary_currency.clone())
        .with_refresher(updater.clone());
    let event_loop = EventLoop::new(transport, router, timing).with_updater(updater);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering chat loop. Press Ctrl+C to stop.");

    tokio::select! {
        _ = event_loop.run_forever() => {}
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
        }
    }

    info!("Bullion Desk shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bullion_desk=info"));

    let json_logging = std::env::var("DESK_LOG_JSON").is_ok();

    if json_logging {
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
