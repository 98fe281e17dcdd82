// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::ConfigFile;

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".whathappens";

/// Global config file names to search for (in order).
pub const GLOBAL_CONFIG_FILES: &[&str] = &["config.yaml", "config.yml", "config.json"];

/// Environment variable overriding the request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "WHATHAPPENS_TIMEOUT_SECS";

/// Environment variable overriding the log filter.
pub const ENV_LOG_LEVEL: &str = "WHATHAPPENS_LOG_LEVEL";

/// Environment variable overriding the statsd address (and enabling metrics).
pub const ENV_STATSD_ADDR: &str = "WHATHAPPENS_STATSD_ADDR";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Load global configuration from ~/.whathappens/, if present.
pub fn load_global_config() -> Result<Option<ConfigFile>, ConfigError> {
    let Some(dir) = get_global_config_dir() else {
        return Ok(None);
    };

    for filename in GLOBAL_CONFIG_FILES {
        let path = dir.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Read overrides from the process environment.
pub fn load_env_config() -> Result<ConfigFile, ConfigError> {
    env_config_from(|key| std::env::var(key).ok())
}

/// Build overrides from an environment lookup function.
pub fn env_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigFile, ConfigError> {
    let mut config = ConfigFile::default();

    if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
        let secs = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::invalid(ENV_TIMEOUT_SECS, e.to_string()))?;
        config.timeout_secs = Some(secs);
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log_level = Some(level);
    }

    if let Some(addr) = lookup(ENV_STATSD_ADDR) {
        config.metrics = Some(super::types::MetricsFileConfig {
            enabled: Some(true),
            statsd_address: Some(addr),
            prefix: None,
        });
    }

    Ok(config)
}
