// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Log subscriber installation.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented output.
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per line, for machine consumption.
    Json,
}

/// How phase events are rendered.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level used when neither a directive nor `RUST_LOG` is given.
    pub default_level: Level,
    pub format: LogFormat,
    /// Print the emitting module next to each event.
    pub include_target: bool,
    pub ansi_colors: bool,
    /// `EnvFilter` directive; takes precedence over `RUST_LOG`.
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            format: LogFormat::Json,
            include_target: false,
            ansi_colors: false,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive)
                .unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string())),
        }
    }
}

impl From<&LoggingConfig> for TelemetryConfig {
    fn from(logging: &LoggingConfig) -> Self {
        let base = Self::default().with_format(logging.format);
        let base = Self {
            ansi_colors: logging.format != LogFormat::Json,
            ..base
        };
        match logging.level.parse::<Level>() {
            Ok(level) => base.with_level(level),
            Err(_) => base.with_filter(logging.level.clone()),
        }
    }
}

/// Token returned by [`init_telemetry`]; hold it for the life of the
/// program.
#[must_use]
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber: env filter plus one fmt layer in the
/// configured format.
///
/// Installing twice is a [`ConfigError::Telemetry`].
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, ConfigError> {
    let filter = config.build_filter();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_target(config.include_target),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(config.ansi_colors)
                    .with_target(config.include_target),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.ansi_colors)
                    .with_target(config.include_target),
            )
            .try_init(),
    };
    installed.map_err(|e| ConfigError::Telemetry(e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
