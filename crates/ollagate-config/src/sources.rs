// Configuration source loading
//
// Loads configuration with priority:
// 1. Environment variables (highest)
// 2. Config file from OLLAGATE_CONFIG path
// 3. Default config files (./ollagate.toml, ./.ollagate.toml)
// 4. Built-in defaults (lowest)
//
// The deployment-facing variables (OLLAMA_BACKEND, LISTEN_PORT, DB_PATH,
// RATE_LIMIT, DISK_PATH, DISK_THRESHOLD, CLEANUP_DAYS, HF_TOKEN) are
// intentionally unprefixed; ancillary knobs use the OLLAGATE_ prefix.

use crate::{LogFormat, RuntimeConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const ENV_PREFIX: &str = "OLLAGATE_";

/// Load configuration from all sources
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = match load_from_file()? {
        Some(file_config) => file_config,
        None => RuntimeConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;

    Ok(config)
}

/// Load configuration from an explicit file path
pub fn load_config_from_path(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config)?;
    config.validate()?;

    Ok(config)
}

/// Load configuration from file, if one is configured or present
fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("OLLAGATE_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    for path in &["./ollagate.toml", "./.ollagate.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config: RuntimeConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

/// Apply environment variable overrides (highest priority)
fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    // Deployment-facing, unprefixed variables
    if let Some(url) = get_env_raw("OLLAMA_BACKEND")? {
        config.backend.url = url;
    }
    if let Some(port) = get_env_raw("LISTEN_PORT")? {
        config.server.port = port
            .parse::<u16>()
            .context("LISTEN_PORT must be a valid port number")?;
    }
    if let Some(path) = get_env_raw("DB_PATH")? {
        config.store.db_path = path;
    }
    if let Some(limit) = get_env_raw("RATE_LIMIT")? {
        config.limits.rate_limit = limit
            .parse::<u32>()
            .context("RATE_LIMIT must be a valid number")?;
    }
    if let Some(path) = get_env_raw("DISK_PATH")? {
        config.disk.path = path;
    }
    if let Some(threshold) = get_env_raw("DISK_THRESHOLD")? {
        config.disk.threshold_percent = threshold
            .parse::<u8>()
            .context("DISK_THRESHOLD must be a percentage")?;
    }
    if let Some(days) = get_env_raw("CLEANUP_DAYS")? {
        config.store.cleanup_days = days
            .parse::<u32>()
            .context("CLEANUP_DAYS must be a valid number")?;
    }
    if let Some(token) = get_env_raw("HF_TOKEN")? {
        config.hub.token = Some(token);
    }

    // Ancillary knobs, OLLAGATE_-prefixed
    if let Some(host) = get_env_string("LISTEN_HOST")? {
        config.server.host = host;
    }
    if let Some(level) = get_env_string("LOG_LEVEL")? {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string("LOG_FORMAT")? {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }
    if let Some(base) = get_env_string("HUB_API")? {
        config.hub.base_url = base;
    }
    if let Some(dir) = get_env_string("CACHE_DIR")? {
        config.hub.cache_dir = dir;
    }
    if let Some(quant) = get_env_string("DEFAULT_QUANT")? {
        config.hub.default_quant = quant;
    }
    if let Some(cmd) = get_env_string("CONVERT_CMD")? {
        config.hub.convert_cmd = cmd;
    }
    if let Some(cmd) = get_env_string("QUANTIZE_CMD")? {
        config.hub.quantize_cmd = cmd;
    }
    if let Some(keep) = get_env_bool("KEEP_WORKDIR")? {
        config.hub.keep_workdir = keep;
    }
    if let Some(enabled) = get_env_bool("WORKER_ENABLED")? {
        config.worker.enabled = enabled;
    }
    if let Some(secs) = get_env_u64("WORKER_POLL_SECS")? {
        config.worker.poll_secs = secs;
    }

    Ok(())
}

/// Helper: Get an unprefixed environment variable
fn get_env_raw(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read env var {}", key)),
    }
}

/// Helper: Get a prefixed environment variable as string
fn get_env_string(key: &str) -> Result<Option<String>> {
    get_env_raw(&format!("{}{}", ENV_PREFIX, key))
}

/// Helper: Get a prefixed environment variable as u64
fn get_env_u64(key: &str) -> Result<Option<u64>> {
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match get_env_string(key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .with_context(|| format!("{} must be a valid number", full_key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Helper: Get a prefixed environment variable as bool
fn get_env_bool(key: &str) -> Result<Option<bool>> {
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match get_env_string(key)? {
        Some(val) => {
            let parsed = match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => anyhow::bail!("{} must be true or false", full_key),
            };
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_config() {
        let content = r#"
            [server]
            port = 8080

            [backend]
            url = "http://localhost:9999"

            [limits]
            rate_limit = 12

            [hub]
            default_quant = "Q5_K_M"
        "#;
        let config: RuntimeConfig = toml::from_str(content).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.url, "http://localhost:9999");
        assert_eq!(config.limits.rate_limit, 12);
        assert_eq!(config.hub.default_quant, "Q5_K_M");
        // Untouched sections keep their defaults
        assert_eq!(config.store.cleanup_days, 30);
    }

    #[test]
    fn empty_env_var_is_ignored() {
        // An empty value must not override a configured one
        env::set_var("OLLAGATE_TEST_EMPTY", "");
        assert_eq!(get_env_raw("OLLAGATE_TEST_EMPTY").unwrap(), None);
        env::remove_var("OLLAGATE_TEST_EMPTY");
    }
}
