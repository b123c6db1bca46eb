use anyhow::{Context, Result};
use clap::Parser;
use ollagate_backend::OllamaClient;
use ollagate_config::RuntimeConfig;
use ollagate_hub::HubClient;
use ollagate_ingest::Worker;
use ollagate_server::{startup_maintenance, AppState};
use ollagate_store::{Db, QueueStore, RateLimiter};
use std::path::PathBuf;
use tracing::info;

/// Transparent Ollama proxy with an off-peak download queue
#[derive(Parser)]
#[command(name = "ollagate")]
#[command(version)]
#[command(about = "Transparent Ollama proxy with an off-peak download queue", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Disable the background queue worker
    #[arg(long)]
    no_worker: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build tokio runtime and run the async gateway
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load().context("Failed to load configuration")?
    };
    apply_cli_overrides(&mut config, &cli);

    ollagate_server::init_tracing(&config);

    info!("ollagate - Ollama proxy with download queue");
    info!("Backend: {}", config.backend.url);
    info!("Listen address: {}", config.server.listen_addr());
    info!("Database: {}", config.store.db_path);
    info!("Rate limit: {} requests/day/IP", config.limits.rate_limit);
    info!("Disk path: {}", config.disk.path);
    info!("Disk threshold: {}%", config.disk.threshold_percent);
    info!("Cleanup days: {}", config.store.cleanup_days);

    // A store that cannot open is fatal; everything downstream degrades
    let db = Db::open(&config.store.db_path)?;
    let queue = QueueStore::new(db.clone());
    let limiter = RateLimiter::new(db.clone(), config.limits.rate_limit);
    let backend = OllamaClient::new(config.backend.url.clone());

    let state = AppState::new(
        queue.clone(),
        limiter,
        db,
        backend.clone(),
        &config.disk,
        &config.hub.default_quant,
    );

    startup_maintenance(&queue, &backend, &state.disk, config.store.cleanup_days).await?;

    if config.worker.enabled {
        let hub = HubClient::new(config.hub.base_url.clone(), config.hub.token.clone());
        let worker = Worker::new(
            queue,
            backend,
            hub,
            config.hub.clone(),
            config.worker.poll_secs,
        );
        tokio::spawn(worker.run());
    } else {
        info!("Queue worker disabled; entries will accumulate until one runs");
    }

    ollagate_server::run(state, &config.server.listen_addr()).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
    if cli.no_worker {
        config.worker.enabled = false;
    }
}
