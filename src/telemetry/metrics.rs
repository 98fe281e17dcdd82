// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics sinks for phase timings.
//!
//! Samples are named by an ordered list of components (`["connect", "tcp"]`)
//! and carry a value in milliseconds. [`Metrics`] aggregates in memory;
//! [`StatsdSink`] forwards each sample as a statsd timer.

use std::collections::{BTreeMap, HashMap};
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// A capability to record named numeric samples.
///
/// Implementations must be safe to share between transports, and must never
/// fail the request that produced the sample.
pub trait MetricsSink: Send + Sync {
    /// Record one sample, in milliseconds.
    fn add_sample(&self, name: &[&str], value: f64);
}

/// Upper bounds of the latency buckets, in milliseconds.
const BUCKET_BOUNDS_MS: [f64; 12] = [
    0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 5_000.0,
];

/// Negative and NaN samples count as zero.
fn clamp_ms(ms: f64) -> f64 {
    if ms.is_nan() {
        0.0
    } else {
        ms.max(0.0)
    }
}

/// In-memory aggregation of phase samples, keyed by dotted name.
#[derive(Debug)]
pub struct Metrics {
    phases: RwLock<HashMap<String, PhaseStats>>,
    started: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            phases: RwLock::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    /// Add a sample under an already-joined name.
    pub fn record(&self, name: &str, ms: f64) {
        let mut phases = self.phases.write().unwrap_or_else(PoisonError::into_inner);
        match phases.get_mut(name) {
            Some(stats) => stats.add(ms),
            None => {
                let mut stats = PhaseStats::default();
                stats.add(ms);
                phases.insert(name.to_string(), stats);
            }
        }
    }

    /// Aggregate for `name` (e.g. `connect.tcp`), if any sample was seen.
    pub fn phase(&self, name: &str) -> Option<PhaseStats> {
        self.phases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let phases = self.phases.read().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            phases: phases
                .iter()
                .map(|(name, stats)| (name.clone(), stats.clone()))
                .collect(),
            uptime: self.uptime(),
        }
    }

    pub fn reset(&self) {
        self.phases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for Metrics {
    fn add_sample(&self, name: &[&str], value: f64) {
        self.record(&name.join("."), value);
    }
}

/// Count, extremes and distribution of one phase's samples.
#[derive(Debug, Clone, Default)]
pub struct PhaseStats {
    pub count: u64,
    pub total_ms: f64,
    /// Zero until the first sample.
    pub min_ms: f64,
    pub max_ms: f64,
    pub histogram: LatencyHistogram,
}

impl PhaseStats {
    fn add(&mut self, ms: f64) {
        let ms = clamp_ms(ms);
        self.min_ms = if self.count == 0 { ms } else { self.min_ms.min(ms) };
        self.max_ms = self.max_ms.max(ms);
        self.count += 1;
        self.total_ms += ms;
        self.histogram.add(ms);
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count {
            0 => 0.0,
            n => self.total_ms / n as f64,
        }
    }
}

/// Bucketed sample counts over [`BUCKET_BOUNDS_MS`], plus an overflow bucket.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    counts: [u64; BUCKET_BOUNDS_MS.len() + 1],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            counts: [0; BUCKET_BOUNDS_MS.len() + 1],
        }
    }
}

impl LatencyHistogram {
    fn add(&mut self, ms: f64) {
        let slot = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.counts[slot] += 1;
    }

    /// Pairs of (upper bound in ms, count); the overflow bucket's bound is infinite.
    pub fn buckets(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        BUCKET_BOUNDS_MS
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter().copied())
    }

    /// Upper bound of the bucket holding the `p`th percentile (0 to 100).
    ///
    /// Samples past the last bound report that bound.
    pub fn percentile(&self, p: f64) -> f64 {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let rank = ((total as f64) * p.clamp(0.0, 100.0) / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (slot, count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= rank {
                return BUCKET_BOUNDS_MS
                    .get(slot)
                    .copied()
                    .unwrap_or(BUCKET_BOUNDS_MS[BUCKET_BOUNDS_MS.len() - 1]);
            }
        }
        BUCKET_BOUNDS_MS[BUCKET_BOUNDS_MS.len() - 1]
    }
}

/// Point-in-time copy of a [`Metrics`], ordered by name.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseStats>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// One line per phase: sample count, then mean, min, max, p50 and p99 in ms.
    pub fn format_report(&self) -> String {
        let mut out = format!("collected over {:.1}s\n", self.uptime.as_secs_f64());
        for (name, stats) in &self.phases {
            out.push_str(&format!(
                "  {name:<20} n={:<5} mean={:.3}ms min={:.3}ms max={:.3}ms p50<={}ms p99<={}ms\n",
                stats.count,
                stats.mean_ms(),
                stats.min_ms,
                stats.max_ms,
                stats.histogram.percentile(50.0),
                stats.histogram.percentile(99.0),
            ));
        }
        out
    }
}

/// Forwards samples to a statsd daemon over UDP as timers.
#[derive(Debug)]
pub struct StatsdSink {
    socket: UdpSocket,
    prefix: String,
}

impl StatsdSink {
    /// Create a sink sending to `address` (e.g. `localhost:8125`).
    pub fn new(address: &str, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let socket_err = |e: std::io::Error| ConfigError::Telemetry(format!("statsd socket: {e}"));
        let target = address
            .to_socket_addrs()
            .map_err(|e| ConfigError::Telemetry(format!("statsd address {address}: {e}")))?
            .next()
            .ok_or_else(|| {
                ConfigError::Telemetry(format!("statsd address {address}: no addresses"))
            })?;
        let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };

        let socket = UdpSocket::bind(local).map_err(socket_err)?;
        socket.connect(target).map_err(socket_err)?;
        socket.set_nonblocking(true).map_err(socket_err)?;
        Ok(Self {
            socket,
            prefix: prefix.into(),
        })
    }

    /// Format one sample as a statsd timer line.
    pub fn format_line(&self, name: &[&str], value: f64) -> String {
        let mut key = self.prefix.clone();
        for part in name {
            if !key.is_empty() {
                key.push('.');
            }
            key.extend(part.chars().map(|c| match c {
                ':' | '|' | '@' | ' ' => '_',
                c => c,
            }));
        }
        format!("{}:{:.6}|ms", key, value.max(0.0))
    }
}

impl MetricsSink for StatsdSink {
    fn add_sample(&self, name: &[&str], value: f64) {
        let line = self.format_line(name, value);
        if let Err(e) = self.socket.send(line.as_bytes()) {
            tracing::debug!(error = %e, metric = %line, "statsd send failed");
        }
    }
}

/// Sends every sample to each of several sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn MetricsSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutSink {
    fn add_sample(&self, name: &[&str], value: f64) {
        for sink in &self.sinks {
            sink.add_sample(name, value);
        }
    }
}
