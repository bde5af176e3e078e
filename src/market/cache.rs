//! Last-known gold price, shared between the updater and chat handlers.
//!
//! The snapshot sits behind a short-lived `RwLock`. Writers build a complete
//! new snapshot under the write lock and swap it in, so readers always get a
//! fully formed copy.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{MarketSnapshot, Trend};

/// Lowest accepted price in USD per ounce.
pub const MIN_PRICE_USD: f64 = 1000.0;
/// Highest accepted price in USD per ounce.
pub const MAX_PRICE_USD: f64 = 10000.0;

/// Whether a candidate price lies in the accepted band.
pub fn is_price_in_band(price: f64) -> bool {
    (MIN_PRICE_USD..=MAX_PRICE_USD).contains(&price)
}

pub struct MarketDataCache {
    snapshot: RwLock<MarketSnapshot>,
}

impl MarketDataCache {
    /// Create a cache holding a seed snapshot. The seed is clamped into the
    /// accepted band.
    pub fn new(seed_price: f64) -> Self {
        let seed = if is_price_in_band(seed_price) {
            seed_price
        } else {
            warn!(seed_price, "Seed price outside band, clamping");
            seed_price.clamp(MIN_PRICE_USD, MAX_PRICE_USD)
        };
        Self {
            snapshot: RwLock::new(MarketSnapshot::seed(seed, Utc::now())),
        }
    }

    /// Current snapshot by value.
    pub fn read(&self) -> MarketSnapshot {
        // A poisoned lock still holds a whole snapshot: writers never leave
        // it half-replaced.
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply `candidate` if it is within the band. Returns whether the
    /// snapshot was replaced.
    pub fn try_update(&self, candidate: f64) -> bool {
        self.try_update_at(candidate, Utc::now())
    }

    /// Same as [`try_update`](Self::try_update) with an explicit timestamp.
    pub fn try_update_at(&self, candidate: f64, at: DateTime<Utc>) -> bool {
        if !is_price_in_band(candidate) {
            debug!(candidate, "Rejected out-of-band quote");
            return false;
        }

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let change = candidate - guard.price_usd_per_ounce;
        *guard = MarketSnapshot {
            price_usd_per_ounce: candidate,
            last_update: at,
            trend: Trend::from_change(change),
            change,
        };
        true
    }
}
