//! Background refresh of the gold price cache.
//!
//! One daemon task fetches a quote, offers it to the cache and sleeps. A
//! successful refresh waits the normal interval; any failure (network,
//! parse, out-of-band value) leaves the cache untouched and waits the
//! shorter recovery interval instead.
//!
//! Opportunistic refreshes (triggered from chat commands) are coalesced: while
//! one is in flight, further triggers are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MarketDataCache, QuoteSource};
use crate::types::DeskError;

/// Sleep intervals between refresh attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterTiming {
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for UpdaterTiming {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15 * 60),
            retry_interval: Duration::from_secs(10 * 60),
        }
    }
}

pub struct RateUpdater {
    source: Arc<dyn QuoteSource>,
    cache: Arc<MarketDataCache>,
    timing: UpdaterTiming,
    refresh_in_flight: AtomicBool,
}

impl RateUpdater {
    pub fn new(source: Arc<dyn QuoteSource>, cache: Arc<MarketDataCache>, timing: UpdaterTiming) -> Self {
        Self {
            source,
            cache,
            timing,
            refresh_in_flight: AtomicBool::new(false),
        }
    }

    /// Fetch one quote and offer it to the cache.
    pub async fn refresh_once(&self) -> Result<f64, DeskError> {
        let price = self.source.fetch_price().await?;
        if self.cache.try_update(price) {
            Ok(price)
        } else {
            Err(DeskError::InvalidQuoteValue(price))
        }
    }

    /// One logged refresh attempt. Returns how long to wait before the next.
    pub async fn refresh_cycle(&self) -> Duration {
        match self.refresh_once().await {
            Ok(price) => {
                let snap = self.cache.read();
                info!(price, trend = %snap.trend, change = snap.change, "Gold price refreshed");
                self.timing.refresh_interval
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Gold price refresh failed, keeping last snapshot");
                self.timing.retry_interval
            }
        }
    }

    /// Refresh forever, starting immediately. Never returns.
    pub async fn run(&self) {
        info!(
            source = self.source.name(),
            refresh_secs = self.timing.refresh_interval.as_secs(),
            retry_secs = self.timing.retry_interval.as_secs(),
            "Rate updater started"
        );
        loop {
            let pause = self.refresh_cycle().await;
            tokio::time::sleep(pause).await;
        }
    }

    /// Run the refresh loop as a detached task whose first attempt waits
    /// `first_pause`. The task dies with the runtime, so it never holds up
    /// process exit.
    pub fn spawn_after(self: Arc<Self>, first_pause: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(first_pause).await;
            self.run().await
        })
    }

    /// Fire-and-forget single refresh. Does nothing outside a runtime or
    /// while another opportunistic refresh is still running.
    pub fn trigger_refresh(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, skipping opportunistic refresh");
            return;
        };
        if self.refresh_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Opportunistic refresh already in flight, skipping");
            return;
        }
        let updater = Arc::clone(self);
        handle.spawn(async move {
            match updater.refresh_once().await {
                Ok(price) => debug!(price, "Opportunistic refresh applied"),
                Err(e) => debug!(error = %e, "Opportunistic refresh failed"),
            }
            updater.refresh_in_flight.store(false, Ordering::Release);
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
