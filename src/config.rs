use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::http::HeaderValue;

/// Runtime configuration, read from the environment (a local `.env`
/// file is honored).
///
/// - `ANALYTICS_ADDR` — listen address, default `127.0.0.1:3001`
/// - `ANALYTICS_DB`   — SQLite path, default `analytics.db`
/// - `CORS_ORIGIN`    — comma-separated allowed origins; unset means
///   any origin (development mode)
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub cors_origins: Option<Vec<HeaderValue>>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = match std::env::var("ANALYTICS_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid ANALYTICS_ADDR: {raw}"))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3001)),
        };

        let db_path = std::env::var("ANALYTICS_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("analytics.db"));

        let cors_origins = match std::env::var("CORS_ORIGIN") {
            Ok(raw) => {
                let origins = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<HeaderValue>()
                            .with_context(|| format!("invalid CORS_ORIGIN entry: {s}"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                if origins.is_empty() {
                    None
                } else {
                    Some(origins)
                }
            }
            Err(_) => None,
        };

        Ok(Self {
            addr,
            db_path,
            cors_origins,
        })
    }
}
