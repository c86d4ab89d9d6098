//! qd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the
//! database and treasury client, spawns the background monitors, wires
//! middleware, and starts the HTTP server.  All route handlers live in
//! `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use qd_daemon::{auth::SessionVerifier, routes, state::AppState};
use qd_ledger::{Ledger, RpcTreasury};
use qd_types::Settings;
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = Settings::from_env()?;
    let pool = qd_db::connect_from_env().await?;
    qd_db::migrate(&pool).await?;

    let ledger: Arc<dyn Ledger> = Arc::new(RpcTreasury::from_env()?);
    let sessions = SessionVerifier::from_env()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = qd_monitor::spawn_disconnect_monitor(
        pool.clone(),
        settings.clone(),
        shutdown_rx.clone(),
    );
    let sweeper = qd_monitor::spawn_sweeper(pool.clone(), settings.clone(), shutdown_rx);

    let shared = Arc::new(AppState::new(pool, ledger, settings, sessions));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("qd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server crashed")?;

    // Stop the background loops after the listener drains.
    let _ = shutdown_tx.send(true);
    let _ = monitor.await;
    let _ = sweeper.await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("QD_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins (the game client in dev; production
/// sits behind a reverse proxy that terminates CORS).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
