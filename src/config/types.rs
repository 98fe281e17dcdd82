// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`ConfigFile`] is the partial, on-disk shape (JSON or YAML, camelCase
//! keys). [`TracerConfig`] is the resolved value handed to transports.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::LogFormat;

/// Default end-to-end request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default redirect limit, matching common HTTP client behavior.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default statsd endpoint.
pub const DEFAULT_STATSD_ADDRESS: &str = "localhost:8125";

/// Default metric name prefix.
pub const DEFAULT_METRICS_PREFIX: &str = "whathappens";

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    /// Maximum number of redirects to follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_redirects: Option<usize>,

    /// User-Agent header sent with each request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Log filter directive (e.g. "info", "whathappens=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Metrics settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsFileConfig>,
}

/// Metrics section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub statsd_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Resolved metrics settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Send samples to statsd.
    pub enabled: bool,
    pub statsd_address: String,
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            statsd_address: DEFAULT_STATSD_ADDRESS.to_string(),
            prefix: DEFAULT_METRICS_PREFIX.to_string(),
        }
    }
}

/// Resolved configuration with all values set.
///
/// Constructed once at startup and passed explicitly to every transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TracerConfig {
    /// End-to-end timeout applied to a whole request chain.
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: format!("whathappens/{}", env!("CARGO_PKG_VERSION")),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl TracerConfig {
    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the redirect limit.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}
