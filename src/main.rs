use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod models;
mod routes;
mod store;


use config::Config;
use routes::AppState;
use store::EventStore;

/// Web-analytics event API.
/// Ingests interaction events from the browser tracker and serves
/// read-only projections (sessions, replay, heatmap, pages).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("failed to open event store at {}", config.db_path.display()))?;
    let state = AppState {
        store: Arc::new(store),
    };

    let cors = match &config.cors_origins {
        Some(origins) => CorsLayer::new().allow_origin(AllowOrigin::list(origins.iter().cloned())),
        None => CorsLayer::new().allow_origin(AllowOrigin::any()),
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers([header::CONTENT_TYPE]);

    let app = routes::router(state)
        .layer(cors)
        // Tracker payloads are small; 10 MB leaves room for bulky metadata
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024));

    tracing::info!(addr = %config.addr, db = %config.db_path.display(), "starting analytics api");

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
