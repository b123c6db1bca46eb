// ollagate-config - Runtime configuration for the proxy and queue worker
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from OLLAGATE_CONFIG env var
// 3. Default config file locations (./ollagate.toml, ./.ollagate.toml)
// 4. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::Deserialize;

mod sources;

/// Main runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub store: StoreConfig,
    pub limits: LimitsConfig,
    pub disk: DiskConfig,
    pub hub: HubConfig,
    pub worker: WorkerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            store: StoreConfig::default(),
            limits: LimitsConfig::default(),
            disk: DiskConfig::default(),
            hub: HubConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// HTTP gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind, combined with `port` into the listen address
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 11434,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Ollama backend the gateway fronts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Ollama daemon
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11435".to_string(),
        }
    }
}

/// Queue database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
    /// Retention window for completed/failed rows, in days
    pub cleanup_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/ollagate/queue.db".to_string(),
            cleanup_days: 30,
        }
    }
}

/// Per-client quota configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Daily pull-request quota per client IP
    pub rate_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { rate_limit: 5 }
    }
}

/// Disk guard configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Path whose filesystem is checked before enqueueing downloads
    pub path: String,
    /// Used-space percentage at which new downloads are rejected
    pub threshold_percent: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            path: "/data/ollama".to_string(),
            threshold_percent: 90,
        }
    }
}

/// Hugging Face hub and ingestion pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub base URL; the REST API lives under `{base}/api`
    pub base_url: String,
    /// Optional bearer token for gated/private repositories
    pub token: Option<String>,
    /// Root for downloaded artifacts and conversion working directories
    pub cache_dir: String,
    /// Quantization used when a request does not name one
    pub default_quant: String,
    /// External converter executable (safetensors -> GGUF)
    pub convert_cmd: String,
    /// External quantizer executable
    pub quantize_cmd: String,
    /// Keep conversion working directories instead of removing them
    pub keep_workdir: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co".to_string(),
            token: None,
            cache_dir: "/var/lib/ollagate/cache".to_string(),
            default_quant: "Q4_K_M".to_string(),
            convert_cmd: "convert-hf-to-gguf".to_string(),
            quantize_cmd: "llama-quantize".to_string(),
            keep_workdir: false,
        }
    }
}

/// Background queue worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Seconds between queue polls when idle
    pub poll_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: 30,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources (defaults, file, environment)
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load from an explicit config file, still honoring env overrides
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_config_from_path(path.as_ref())
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.is_empty() {
            anyhow::bail!("backend url must not be empty");
        }
        if self.limits.rate_limit == 0 {
            anyhow::bail!("rate_limit must be at least 1");
        }
        if self.disk.threshold_percent == 0 || self.disk.threshold_percent > 100 {
            anyhow::bail!(
                "disk threshold must be between 1 and 100, got {}",
                self.disk.threshold_percent
            );
        }
        if self.store.db_path.is_empty() {
            anyhow::bail!("db_path must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr(), "0.0.0.0:11434");
        assert_eq!(config.limits.rate_limit, 5);
        assert_eq!(config.disk.threshold_percent, 90);
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let mut config = RuntimeConfig::default();
        config.limits.rate_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = RuntimeConfig::default();
        config.disk.threshold_percent = 0;
        assert!(config.validate().is_err());
        config.disk.threshold_percent = 101;
        assert!(config.validate().is_err());
    }
}
