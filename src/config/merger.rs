// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::time::Duration;

use crate::error::ConfigError;
use crate::telemetry::LogFormat;

use super::types::{ConfigFile, TracerConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub timeout_secs: Option<f64>,
    pub max_redirects: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub statsd_address: Option<String>,
    pub metrics_prefix: Option<String>,
}

/// Merge configuration sources with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Environment variables
/// 3. Config file (explicit path, or ~/.whathappens/config.yaml)
/// 4. Default values
pub fn merge_config(
    file: Option<ConfigFile>,
    env: ConfigFile,
    cli: CliOptions,
) -> Result<TracerConfig, ConfigError> {
    let mut result = TracerConfig::default();

    if let Some(config) = file {
        apply_config_file(&mut result, &config)?;
    }
    apply_config_file(&mut result, &env)?;
    apply_cli_options(&mut result, &cli)?;

    Ok(result)
}

fn timeout_from_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    if secs <= 0.0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

fn apply_config_file(result: &mut TracerConfig, config: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(secs) = config.timeout_secs {
        result.timeout = timeout_from_secs("timeoutSecs", secs)?;
    }

    if let Some(max) = config.max_redirects {
        result.max_redirects = max;
    }

    if let Some(ref agent) = config.user_agent {
        result.user_agent = agent.clone();
    }

    if let Some(ref level) = config.log_level {
        result.logging.level = level.clone();
    }

    if let Some(format) = config.log_format {
        result.logging.format = format;
    }

    if let Some(ref metrics) = config.metrics {
        if let Some(enabled) = metrics.enabled {
            result.metrics.enabled = enabled;
        }
        if let Some(ref addr) = metrics.statsd_address {
            result.metrics.statsd_address = addr.clone();
        }
        if let Some(ref prefix) = metrics.prefix {
            result.metrics.prefix = prefix.clone();
        }
    }

    Ok(())
}

fn apply_cli_options(result: &mut TracerConfig, cli: &CliOptions) -> Result<(), ConfigError> {
    if let Some(secs) = cli.timeout_secs {
        result.timeout = timeout_from_secs("--timeout", secs)?;
    }

    if let Some(max) = cli.max_redirects {
        result.max_redirects = max;
    }

    if let Some(ref level) = cli.log_level {
        result.logging.level = level.clone();
    }

    if let Some(format) = cli.log_format {
        result.logging.format = format;
    }

    // Naming a statsd address on the command line turns metrics on.
    if let Some(ref addr) = cli.statsd_address {
        result.metrics.enabled = true;
        result.metrics.statsd_address = addr.clone();
    }

    if let Some(ref prefix) = cli.metrics_prefix {
        result.metrics.prefix = prefix.clone();
    }

    Ok(())
}
