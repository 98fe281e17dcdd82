// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for whathappens.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Config file: an explicit `--config` path, or ~/.whathappens/config.yaml
//! - Environment: `WHATHAPPENS_*` variables
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > env > file > defaults). The
//! result is a [`TracerConfig`] that callers pass to each transport; there is
//! no process-wide configuration state.

mod loader;
mod merger;
mod types;

pub use loader::{
    env_config_from, get_global_config_dir, load_config_file, load_env_config, load_global_config,
    ENV_LOG_LEVEL, ENV_STATSD_ADDR, ENV_TIMEOUT_SECS, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILES,
};

pub use merger::{merge_config, CliOptions};

pub use types::{
    ConfigFile, LoggingConfig, MetricsConfig, MetricsFileConfig, TracerConfig,
    DEFAULT_MAX_REDIRECTS, DEFAULT_METRICS_PREFIX, DEFAULT_STATSD_ADDRESS, DEFAULT_TIMEOUT,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources.
///
/// This is the main entry point for configuration loading. An explicit
/// `path` must exist; without one the global config is used if present.
pub fn load_config(
    path: Option<&Path>,
    cli_options: CliOptions,
) -> Result<TracerConfig, ConfigError> {
    let file = match path {
        Some(path) => Some(load_config_file(path)?),
        None => load_global_config()?,
    };
    let env = load_env_config()?;

    merge_config(file, env, cli_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.yaml");
        std::fs::write(&path, "maxRedirects: 4\nuserAgent: sample\n").unwrap();

        let config = load_config(Some(&path), CliOptions::default()).unwrap();
        assert_eq!(config.max_redirects, 4);
        assert_eq!(config.user_agent, "sample");
    }

    #[test]
    fn test_load_config_cli_override() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.json");
        std::fs::write(&path, r#"{"maxRedirects": 4}"#).unwrap();

        let cli = CliOptions {
            max_redirects: Some(1),
            ..Default::default()
        };
        let config = load_config(Some(&path), cli).unwrap();
        assert_eq!(config.max_redirects, 1); // CLI wins
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let result = load_config(Some(&temp.path().join("absent.yaml")), CliOptions::default());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_timeout_constant() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(60));
    }
}
