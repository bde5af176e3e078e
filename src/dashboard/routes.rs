//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::format::{format_secondary, format_usd, SecondaryCurrency};
use crate::market::MarketDataCache;
use crate::session::{SessionCounts, SessionStore};
use crate::types::Trend;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub cache: Arc<MarketDataCache>,
    pub sessions: Arc<SessionStore>,
    pub currency: SecondaryCurrency,
}

impl DashboardState {
    pub fn new(cache: Arc<MarketDataCache>, sessions: Arc<SessionStore>, currency: SecondaryCurrency) -> Self {
        Self { cache, sessions, currency }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RateResponse {
    pub price_usd_per_ounce: f64,
    pub change: f64,
    pub trend: Trend,
    pub last_update: DateTime<Utc>,
    pub price_formatted: String,
    pub secondary_formatted: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/rate
pub async fn get_rate(State(state): State<AppState>) -> Json<RateResponse> {
    let snap = state.cache.read();
    let price = Some(snap.price_usd_per_ounce);
    Json(RateResponse {
        price_usd_per_ounce: snap.price_usd_per_ounce,
        change: snap.change,
        trend: snap.trend,
        last_update: snap.last_update,
        price_formatted: format_usd(price),
        secondary_formatted: format_secondary(price, &state.currency),
    })
}

/// GET /api/sessions
pub async fn get_sessions(State(state): State<AppState>) -> Json<SessionCounts> {
    Json(state.sessions.counts())
}

/// GET /health
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
