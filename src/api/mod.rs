//! HTTP surface — Axum JSON API for the wager ledger.
//!
//! Routes: place a wager, read a pool, stream pool updates (SSE), read
//! one's balance, request a simulated verdict. CORS enabled for the web
//! front end.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tracing::info;

use routes::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/wagers", post(routes::place_wager))
        .route("/api/pools/:case_id", get(routes::get_pool))
        .route("/api/pools/:case_id/stream", get(routes::stream_pool))
        .route("/api/me", get(routes::get_me))
        .route("/api/verdict", post(routes::post_verdict))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until shutdown. Blocks the calling task.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!(port, "API listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await
        .context("API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
