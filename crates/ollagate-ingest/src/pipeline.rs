//! Hub ingestion pipeline: plan, obtain an artifact, register it.

use crate::convert;
use crate::modelfile::{render_modelfile, ModelfileOptions};
use anyhow::{bail, Context, Result};
use ollagate_backend::OllamaClient;
use ollagate_config::HubConfig;
use ollagate_hub::{normalize_quant, plan_repo, select_artifact, HubClient};
use ollagate_store::HubSpec;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ingest one hub request end to end.
pub(crate) async fn ingest(
    hub: &HubClient,
    backend: &OllamaClient,
    cfg: &HubConfig,
    spec: &HubSpec,
) -> Result<()> {
    let quant = normalize_quant(spec.quant.as_deref().unwrap_or(&cfg.default_quant));
    let name = spec.registered_name();
    let cache_dir = Path::new(&cfg.cache_dir);
    let gguf_dir = cache_dir.join("gguf");

    let profile = plan_repo(hub, &spec.repo_id)
        .await
        .with_context(|| format!("failed to profile {}", spec.repo_id))?;

    let artifact = if let Some(packaged) = &profile.packaged {
        let file = select_artifact(&packaged.files, &quant)
            .context("packaged repository lists no artifact files")?;
        info!(
            "Fetching packaged artifact {} from {}",
            file, packaged.repo
        );
        hub.download(&packaged.repo, file, &gguf_dir)
            .await
            .with_context(|| format!("failed to download {}", file))?
    } else if profile.is_convertible {
        convert_repo(hub, cfg, spec, &quant, &name, cache_dir, &gguf_dir).await?
    } else {
        bail!("{}: {}", spec.repo_id, profile.unprocessable_reason());
    };

    let modelfile = render_modelfile(&artifact, &ModelfileOptions::default());
    backend
        .create(&name, &modelfile)
        .await
        .with_context(|| format!("failed to register {} with backend", name))?;
    info!("Registered {} from {}", name, artifact.display());
    Ok(())
}

/// Convert path: download raw weights, run the converter, then the
/// quantizer unless f16 was requested. The working directory is removed on
/// both success and failure unless configured otherwise.
async fn convert_repo(
    hub: &HubClient,
    cfg: &HubConfig,
    spec: &HubSpec,
    quant: &str,
    name: &str,
    cache_dir: &Path,
    gguf_dir: &Path,
) -> Result<PathBuf> {
    let workdir = convert::workdir_for(cache_dir, &spec.repo_id);
    tokio::fs::create_dir_all(&workdir).await?;

    let result = convert_in_workdir(hub, cfg, spec, quant, name, &workdir, gguf_dir).await;

    if cfg.keep_workdir {
        info!("Keeping working directory {}", workdir.display());
    } else if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
        warn!("Failed to clean working directory {}: {}", workdir.display(), e);
    }

    result
}

async fn convert_in_workdir(
    hub: &HubClient,
    cfg: &HubConfig,
    spec: &HubSpec,
    quant: &str,
    name: &str,
    workdir: &Path,
    gguf_dir: &Path,
) -> Result<PathBuf> {
    convert::fetch_sources(hub, &spec.repo_id, workdir).await?;

    let f16_path = workdir.join("f16.gguf");
    convert::run_converter(&cfg.convert_cmd, workdir, &f16_path).await?;

    let produced = if quant == "F16" {
        f16_path
    } else {
        let quantized = workdir.join(format!("model-{}.gguf", quant));
        convert::run_quantizer(&cfg.quantize_cmd, &f16_path, &quantized, quant).await?;
        quantized
    };

    // The artifact must outlive workdir cleanup
    tokio::fs::create_dir_all(gguf_dir).await?;
    let final_path = gguf_dir.join(format!("{}-{}.gguf", name, quant));
    tokio::fs::rename(&produced, &final_path)
        .await
        .with_context(|| format!("failed to move artifact to {}", final_path.display()))?;
    Ok(final_path)
}
