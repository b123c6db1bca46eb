//! Startup maintenance: queue recovery and environment preflight.

use anyhow::Result;
use ollagate_backend::OllamaClient;
use ollagate_store::QueueStore;
use tracing::{info, warn};

use crate::DiskGuard;

/// Run the startup reconciliation sequence against the store, then log the
/// state of the world. Called once, before the gateway starts serving.
pub async fn startup_maintenance(
    queue: &QueueStore,
    backend: &OllamaClient,
    disk: &DiskGuard,
    cleanup_days: u32,
) -> Result<()> {
    // Interrupted downloads from a previous run go back to pending
    queue.recover_orphans()?;

    // Terminal rows past the retention window are dropped
    queue.sweep_retention(cleanup_days)?;

    // Completed rows whose model vanished from the backend re-queue.
    // An unreachable backend skips the check rather than resetting rows.
    match backend.model_names().await {
        Ok(catalog) => {
            queue.reconcile_completed(&catalog)?;
        }
        Err(e) => warn!("Could not verify completed models: {}", e),
    }

    let report = disk.check();
    if report.is_ok() {
        info!(
            "Disk space: {}% used, {}GB free",
            report
                .used_percent
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
            report
                .free_gb
                .map(|g| g.to_string())
                .unwrap_or_else(|| "?".to_string()),
        );
    } else {
        warn!(
            "Disk space critical: {}% used",
            report
                .used_percent
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
        );
    }

    match backend.ping().await {
        Ok(()) => info!("Backend connectivity: OK"),
        Err(e) => {
            warn!("Backend connectivity: FAILED ({})", e);
            warn!("Proxy will start anyway, but requests may fail");
        }
    }

    Ok(())
}
