// HTTP gateway in front of the Ollama backend
//
// Intercepts pull and delete requests, serves the admin endpoints, and
// streams everything else through to the backend unchanged.

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use ollagate_backend::OllamaClient;
use ollagate_config::{DiskConfig, LogFormat, RuntimeConfig};
use ollagate_store::{Db, QueueStore, RateLimiter};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

mod disk;
mod error;
mod handlers;
mod proxy;
mod startup;

pub use disk::{DiskGuard, DiskReport, DiskStatus};
pub use error::GatewayError;
pub use startup::startup_maintenance;

/// Proxied calls may carry long model transfers.
const PROXY_TIMEOUT: Duration = Duration::from_secs(300);

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub queue: QueueStore,
    pub limiter: RateLimiter,
    pub db: Db,
    pub backend: OllamaClient,
    pub disk: DiskGuard,
    /// Quantization assumed when a hub request does not name one
    pub default_quant: String,
    proxy_http: reqwest::Client,
}

impl AppState {
    pub fn new(
        queue: QueueStore,
        limiter: RateLimiter,
        db: Db,
        backend: OllamaClient,
        disk_cfg: &DiskConfig,
        default_quant: &str,
    ) -> Self {
        Self {
            queue,
            limiter,
            db,
            backend,
            disk: DiskGuard::new(&disk_cfg.path, disk_cfg.threshold_percent),
            default_quant: default_quant.to_string(),
            proxy_http: reqwest::Client::builder()
                .timeout(PROXY_TIMEOUT)
                .build()
                .expect("proxy http client builds"),
        }
    }

    /// Replace the disk guard, e.g. with a fixed one in tests.
    pub fn with_disk(mut self, disk: DiskGuard) -> Self {
        self.disk = disk;
        self
    }
}

/// Build the gateway router: exact-path intercepts, everything else streams
/// through to the backend.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/queue",
            get(handlers::queue_status).delete(handlers::queue_delete),
        )
        .route("/api/health", get(handlers::health))
        .route("/api/tags", get(handlers::tags))
        .route("/api/pull", post(handlers::pull))
        .route("/api/hf/queue", post(handlers::hf_queue))
        .route("/api/delete", delete(handlers::model_delete))
        .fallback(proxy::passthrough)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.server.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Serve the gateway until a shutdown signal arrives.
pub async fn run(state: AppState, listen_addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .context(format!("Failed to bind to {}", listen_addr))?;

    info!("Proxy listening on http://{}", listen_addr);
    info!("Routes:");
    info!("  GET    /api/queue    - queue status");
    info!("  DELETE /api/queue    - remove a pending entry");
    info!("  GET    /api/health   - aggregate health");
    info!("  GET    /api/tags     - merged catalog");
    info!("  POST   /api/pull     - intercepted model pull");
    info!("  POST   /api/hf/queue - queue a Hugging Face model");
    info!("  DELETE /api/delete   - intercepted model delete");
    info!("  *                    - transparent pass-through");
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
