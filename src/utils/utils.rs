// src/utils/utils.rs

use axum::{http::StatusCode, routing::get, serve, Router};
use prometheus::{gather, Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::Result;

/// Installs the global fmt subscriber. `RUST_LOG` wins; otherwise
/// `default_level` is used. Logs go to stderr so progress bars on stdout stay
/// readable.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// Axum handler for /metrics
async fn metrics_handler() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&gather(), &mut buffer) {
        error!("Could not encode prometheus metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not encode prometheus metrics: {}", e),
        );
    }
    match String::from_utf8(buffer) {
        Ok(s) => (StatusCode::OK, s),
        Err(e) => {
            error!("Prometheus metrics UTF-8 error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prometheus metrics UTF-8 error: {}", e),
            )
        }
    }
}

/// Router exposing `/metrics`, shared by the standalone endpoint and the web
/// surface.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Spawns the Prometheus endpoint when a port is given.
pub async fn setup_prometheus_metrics(metrics_port: Option<u16>) -> Result<()> {
    if let Some(port) = metrics_port {
        let listener_addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&listener_addr).await?;
        info!(
            "Metrics endpoint will be available at http://{}/metrics",
            listener_addr
        );

        tokio::spawn(async move {
            if let Err(e) = serve(listener, metrics_router()).await {
                error!("Metrics server error: {}", e);
            }
        });
    } else {
        info!("Prometheus metrics endpoint not configured (no port specified).");
    }
    Ok(())
}
