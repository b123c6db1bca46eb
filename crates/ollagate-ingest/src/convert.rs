//! External converter and quantizer invocation.
//!
//! Tools run as argv vectors through `tokio::process`, never a shell, with
//! a one-hour deadline per stage. A failing tool's exit status and captured
//! output become the row's diagnostic.

use anyhow::{bail, Context, Result};
use ollagate_hub::HubClient;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const TOOL_TIMEOUT: Duration = Duration::from_secs(3600);
const DIAGNOSTIC_LIMIT: usize = 2000;

/// Source-repo files the converter needs: weights plus descriptor files.
fn is_source_file(name: &str) -> bool {
    name.ends_with(".safetensors") || name.ends_with(".json") || name == "tokenizer.model"
}

/// Download the raw weights and descriptors for `repo` into `workdir`.
pub(crate) async fn fetch_sources(client: &HubClient, repo: &str, workdir: &Path) -> Result<()> {
    let files = client.list_files(repo).await?;
    let sources: Vec<&String> = files.iter().filter(|f| is_source_file(f)).collect();

    if !sources.iter().any(|f| f.as_str() == "config.json") {
        bail!("repository {} has no config.json; cannot convert", repo);
    }

    info!("Fetching {} source files from {}", sources.len(), repo);
    for file in sources {
        client
            .download(repo, file, workdir)
            .await
            .with_context(|| format!("failed to download {}", file))?;
    }
    Ok(())
}

/// Convert the weights in `input_dir` to an f16 GGUF at `out_file`.
pub(crate) async fn run_converter(cmd: &str, input_dir: &Path, out_file: &Path) -> Result<()> {
    let argv = vec![
        input_dir.as_os_str().to_os_string(),
        "--outfile".into(),
        out_file.as_os_str().to_os_string(),
        "--outtype".into(),
        "f16".into(),
    ];
    run_tool("converter", cmd, &argv).await?;
    if !out_file.exists() {
        bail!("converter exited cleanly but produced no output file");
    }
    Ok(())
}

/// Quantize `input` to `quant`, writing `output`.
pub(crate) async fn run_quantizer(
    cmd: &str,
    input: &Path,
    output: &Path,
    quant: &str,
) -> Result<()> {
    let argv = vec![
        input.as_os_str().to_os_string(),
        output.as_os_str().to_os_string(),
        quant.into(),
    ];
    run_tool("quantizer", cmd, &argv).await?;
    if !output.exists() {
        bail!("quantizer exited cleanly but produced no output file");
    }
    Ok(())
}

async fn run_tool(label: &str, cmd: &str, argv: &[std::ffi::OsString]) -> Result<()> {
    info!("Running {} ({})", label, cmd);
    let output = tokio::time::timeout(TOOL_TIMEOUT, Command::new(cmd).args(argv).output())
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", label, TOOL_TIMEOUT))?
        .with_context(|| format!("failed to spawn {} '{}'", label, cmd))?;

    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            label,
            output.status,
            diagnostic(&output)
        );
    }
    Ok(())
}

/// Tail of combined tool output, bounded for storage in the error column.
fn diagnostic(output: &Output) -> String {
    let mut combined = String::new();
    combined.push_str(String::from_utf8_lossy(&output.stdout).trim());
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim());
    }
    if combined.len() > DIAGNOSTIC_LIMIT {
        let start = combined.len() - DIAGNOSTIC_LIMIT;
        // Avoid splitting a UTF-8 sequence
        let start = (start..combined.len())
            .find(|i| combined.is_char_boundary(*i))
            .unwrap_or(combined.len());
        combined = combined[start..].to_string();
    }
    combined
}

/// Per-repo working directory under the cache root.
pub(crate) fn workdir_for(cache_dir: &Path, repo: &str) -> PathBuf {
    cache_dir.join(repo.replace('/', "_"))
}
