//! Background queue worker.
//!
//! Polls the queue, claims one row at a time, and resolves it: native rows
//! are pulled through the backend's own downloader, hub rows go through the
//! ingestion pipeline (plan, fetch or convert, register). Every per-row
//! fault is caught and recorded on the row; the worker itself never dies.

use anyhow::Result;
use ollagate_backend::OllamaClient;
use ollagate_config::HubConfig;
use ollagate_hub::HubClient;
use ollagate_store::{HubSpec, QueueEntry, QueueKind, QueueStore};
use std::time::Duration;
use tracing::{error, info, warn};

mod convert;
mod modelfile;
mod pipeline;

pub use modelfile::{render_modelfile, ModelfileOptions};

pub struct Worker {
    queue: QueueStore,
    backend: OllamaClient,
    hub: HubClient,
    hub_cfg: HubConfig,
    poll: Duration,
}

impl Worker {
    pub fn new(
        queue: QueueStore,
        backend: OllamaClient,
        hub: HubClient,
        hub_cfg: HubConfig,
        poll_secs: u64,
    ) -> Self {
        Self {
            queue,
            backend,
            hub,
            hub_cfg,
            poll: Duration::from_secs(poll_secs.max(1)),
        }
    }

    /// Drain the queue forever. Intended to run on its own task; only one
    /// worker may run against a given store.
    pub async fn run(self) {
        info!("Queue worker started (poll every {:?})", self.poll);
        loop {
            match self.process_one().await {
                Ok(true) => {} // keep draining while rows are available
                Ok(false) => tokio::time::sleep(self.poll).await,
                Err(e) => {
                    error!("Queue worker iteration failed: {:#}", e);
                    tokio::time::sleep(self.poll).await;
                }
            }
        }
    }

    /// Claim and resolve one row. Returns false when the queue is empty.
    pub async fn process_one(&self) -> Result<bool> {
        let Some(entry) = self.queue.claim_next()? else {
            return Ok(false);
        };

        info!(
            "Processing queue entry id={} model={} kind={}",
            entry.id,
            entry.model,
            entry.kind.as_str()
        );

        match self.execute(&entry).await {
            Ok(()) => {
                self.queue.mark_completed(entry.id)?;
                info!("Queue entry id={} completed", entry.id);
            }
            Err(e) => {
                let diagnostic = format!("{:#}", e);
                warn!("Queue entry id={} failed: {}", entry.id, diagnostic);
                self.queue.mark_failed(entry.id, &diagnostic)?;
            }
        }
        Ok(true)
    }

    async fn execute(&self, entry: &QueueEntry) -> Result<()> {
        match entry.kind {
            QueueKind::Native => {
                self.backend.pull(&entry.model).await?;
                Ok(())
            }
            QueueKind::Hub => {
                let spec = HubSpec::parse(&entry.model);
                pipeline::ingest(&self.hub, &self.backend, &self.hub_cfg, &spec).await
            }
        }
    }
}
