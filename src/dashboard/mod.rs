//! Dashboard: Axum status server for monitoring the desk.
//!
//! Serves a small read-only JSON API: liveness, the cached gold quote and
//! session counts. CORS allows GET from anywhere.

pub mod routes;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the status server.
///
/// This spawns a background task; it doesn't block. Bind or serve errors
/// are logged; the console keeps running without the dashboard.
pub fn spawn_dashboard(state: AppState, port: u16) {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(port, error = %e, "Failed to bind dashboard port, dashboard disabled");
                return;
            }
        };
        info!(port, "Dashboard server starting on http://localhost:{port}");

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/rate", get(routes::get_rate))
        .route("/api/sessions", get(routes::get_sessions))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
