// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for whathappens.
//!
//! This module provides strongly-typed errors for the tracing transport, the
//! dispatch mechanism it wraps, and configuration loading, using `thiserror`
//! for ergonomic error definitions and `anyhow` for propagation in the binary.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the tracing transport and the report assembler.
#[derive(Error, Debug)]
pub enum TraceError {
    /// A method was called on a transport handle that was never constructed.
    #[error("nil transport")]
    NilTransport,

    /// Planned functionality that has no implementation yet.
    #[error("not yet implemented")]
    NotImplemented,

    /// The system entropy source could not produce identifier bytes.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// Passed through unchanged from the wrapped dispatch mechanism.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl TraceError {
    /// Check if this error means "unsupported" rather than "failed".
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    /// Check if this error came from a nil transport handle.
    pub fn is_nil_transport(&self) -> bool {
        matches!(self, Self::NilTransport)
    }

    /// Get the underlying dispatch error, if any.
    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match self {
            Self::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors that can occur while performing a single request-response exchange.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("DNS lookup for {host} failed: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Request canceled")]
    Canceled,

    #[error("Stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<http::Error> for DispatchError {
    fn from(err: http::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Errors that can occur during configuration loading and sink setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
