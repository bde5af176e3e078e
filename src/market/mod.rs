//! Gold market data.
//!
//! Defines the `QuoteSource` trait, the shared snapshot cache and the
//! background updater that keeps it fresh.

pub mod cache;
pub mod goldapi;
pub mod updater;

use async_trait::async_trait;

use crate::types::DeskError;

pub use cache::MarketDataCache;
pub use updater::{RateUpdater, UpdaterTiming};

/// Abstraction over external gold quote providers.
///
/// Implementors return the raw spot price in USD per ounce. Band checks
/// are the cache's job, not the source's.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the current spot price.
    async fn fetch_price(&self) -> Result<f64, DeskError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
