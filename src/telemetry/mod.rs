// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and metrics sinks.
//!
//! - **Logging**: phase events are `tracing` events at info level; this
//!   module installs the subscriber that renders them.
//! - **Metrics**: an optional [`MetricsSink`] receives one sample per
//!   completed phase.
//!
//! # Usage
//!
//! ```rust,ignore
//! use whathappens::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    FanoutSink, LatencyHistogram, Metrics, MetricsSink, MetricsSnapshot, PhaseStats, StatsdSink,
};
