//! Shared types for the desk.
//!
//! Dealer identities, the market snapshot, user identities and the
//! domain error enum live here so that the market, session and bot
//! layers can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Dealers
// ---------------------------------------------------------------------------

/// Seniority level of a registered dealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealerLevel {
    Admin,
    Senior,
    Standard,
    Junior,
}

impl fmt::Display for DealerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealerLevel::Admin => write!(f, "admin"),
            DealerLevel::Senior => write!(f, "senior"),
            DealerLevel::Standard => write!(f, "standard"),
            DealerLevel::Junior => write!(f, "junior"),
        }
    }
}

/// A registered operator. Loaded once from the static registry and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerIdentity {
    pub id: String,
    pub display_name: String,
    pub level: DealerLevel,
    pub active: bool,
    pub permissions: BTreeSet<String>,
}

impl DealerIdentity {
    pub fn new(id: &str, display_name: &str, level: DealerLevel, active: bool, permissions: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            level,
            active,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl fmt::Display for DealerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.level)
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Direction of the last price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    /// Derive the trend from a signed price change.
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }

    /// Short label shown to dealers.
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Up => "▲ up",
            Trend::Down => "▼ down",
            Trend::Stable => "■ stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// The latest known gold price. Replaced wholesale on every accepted
/// refresh, never edited field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Spot price in USD per troy ounce, always within the accepted band.
    pub price_usd_per_ounce: f64,
    pub last_update: DateTime<Utc>,
    pub trend: Trend,
    /// Difference to the immediately preceding snapshot's price.
    pub change: f64,
}

impl MarketSnapshot {
    /// Initial snapshot with no prior movement.
    pub fn seed(price_usd_per_ounce: f64, at: DateTime<Utc>) -> Self {
        Self {
            price_usd_per_ounce,
            last_update: at,
            trend: Trend::Stable,
            change: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat identities
// ---------------------------------------------------------------------------

/// Opaque identity of a chat user, as assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the desk. None of them is fatal to the
/// process.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeskError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Quote fetch failed: {0}")]
    QuoteFetch(String),

    #[error("Quote value out of accepted band: {0}")]
    InvalidQuoteValue(f64),

    #[error("Unknown or inactive dealer: {0}")]
    UnknownDealer(String),

    #[error("No login in progress")]
    NoActiveSession,

    #[error("Wrong PIN")]
    WrongPin,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeskError {
    /// Short human-readable text for chat replies. Never includes raw
    /// error detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeskError::UnknownDealer(_) => "That dealer profile is not available. Send /start to pick again.",
            DeskError::NoActiveSession => "Please send /start to log in first.",
            DeskError::WrongPin => "Incorrect PIN. Please try again.",
            DeskError::QuoteFetch(_) | DeskError::InvalidQuoteValue(_) => {
                "The gold price is temporarily unavailable."
            }
            DeskError::Transport(_) | DeskError::Config(_) => "Something went wrong. Please try again later.",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
