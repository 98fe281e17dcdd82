// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Whathappens - see what happens during an HTTP round trip.
//!
//! A tracing transport wraps the request-dispatch mechanism and reports
//! every phase of each attempt (connection acquisition, DNS, connect, TLS
//! handshake, informational responses, first response byte) as structured
//! log events and optional latency samples.
//!
//! # Architecture
//!
//! - [`trace`] - correlation IDs, phase hooks, the tracing [`Transport`] and HAR timings
//! - [`dispatch`] - the HTTP/1.1 dispatch mechanism the transport wraps
//! - [`client`] - a client with timeout and redirect handling bound to a transport
//! - [`config`] - configuration loading and merging
//! - [`telemetry`] - log subscriber setup and metric sinks
//! - [`error`] - error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whathappens::{Transport, TracerConfig};
//!
//! let transport = Transport::new(Arc::new(TracerConfig::default()));
//! let client = transport.make_client()?;
//! let response = client.get("https://example.com/").await?;
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod telemetry;
pub mod trace;

pub use client::{effective_uri, Client, EffectiveUri};
pub use config::TracerConfig;
pub use error::{ConfigError, DispatchError, Result, TraceError};
pub use trace::{ClientTrace, CoreId, RequestId, Timings, Transport, TransportId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
