// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Whathappens main entry point - trace GET requests to a URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;

use whathappens::config::{self, CliOptions, TracerConfig};
use whathappens::telemetry::{self, FanoutSink, Metrics, MetricsSink, StatsdSink, TelemetryConfig};
use whathappens::{effective_uri, Transport};

/// See what happens during an HTTP round trip.
#[derive(Parser)]
#[command(name = "whathappens")]
#[command(author, version, about = "Per-phase timings for HTTP requests", long_about = None)]
struct Cli {
    /// URL to request
    url: String,

    /// Seconds to wait between runs
    #[arg(short, long, default_value_t = 1.0)]
    interval: f64,

    /// Number of runs; zero or negative runs forever
    #[arg(short = 'n', long, default_value_t = 1, allow_negative_numbers = true)]
    count: i64,

    /// End-to-end request timeout in seconds, redirects included
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Path to a config file (.json, .yaml or .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Send phase durations to a statsd listener at this address
    #[arg(long)]
    statsd: Option<String>,

    /// Prefix for statsd metric names
    #[arg(long)]
    metrics_prefix: Option<String>,

    /// Print a latency report when done
    #[arg(short, long)]
    report: bool,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// Single-line, human-readable
    Compact,
    /// One JSON object per event
    Json,
}

impl From<LogFormat> for telemetry::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => telemetry::LogFormat::Pretty,
            LogFormat::Compact => telemetry::LogFormat::Compact,
            LogFormat::Json => telemetry::LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{e:#}"), "error");
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cli_options = CliOptions {
        timeout_secs: cli.timeout,
        max_redirects: None,
        log_level: cli.log_level.clone(),
        log_format: cli.log_format.map(Into::into),
        statsd_address: cli.statsd.clone(),
        metrics_prefix: cli.metrics_prefix.clone(),
    };
    let config = Arc::new(config::load_config(cli.config.as_deref(), cli_options)?);
    let _guard = telemetry::init_telemetry(&TelemetryConfig::from(&config.logging))?;

    let report = Arc::new(Metrics::new());
    let sink = build_sink(&config, cli.report.then(|| report.clone()))?;
    let interval = Duration::try_from_secs_f64(cli.interval.max(0.0))?;

    let mut run = 0i64;
    loop {
        run += 1;
        trace_once(&config, sink.clone(), &cli.url).await?;

        if cli.count > 0 && run >= cli.count {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    if cli.report {
        println!("{}", "Latency report".bright_blue().bold());
        println!("{}", report.snapshot().format_report());
    }
    Ok(())
}

fn build_sink(
    config: &TracerConfig,
    report: Option<Arc<Metrics>>,
) -> anyhow::Result<Option<Arc<dyn MetricsSink>>> {
    let mut fanout = FanoutSink::new();
    if let Some(report) = report {
        fanout.push(report);
    }
    if config.metrics.enabled {
        let statsd =
            StatsdSink::new(&config.metrics.statsd_address, config.metrics.prefix.clone())?;
        fanout.push(Arc::new(statsd));
    }
    if fanout.is_empty() {
        return Ok(None);
    }
    Ok(Some(Arc::new(fanout)))
}

/// One traced GET through a fresh transport; the body is discarded.
async fn trace_once(
    config: &Arc<TracerConfig>,
    sink: Option<Arc<dyn MetricsSink>>,
    url: &str,
) -> anyhow::Result<()> {
    let mut builder = Transport::builder(config.clone());
    if let Some(sink) = sink {
        builder = builder.metrics(sink);
    }
    let transport = builder.build();
    let client = transport.make_client()?;

    let response = client.get(url).await?;
    tracing::info!(
        transport = %transport.transport_id()?,
        status = response.status().as_u16(),
        bytes = response.body().len(),
        url = %effective_uri(&response).map_or_else(|| url.to_string(), ToString::to_string),
        "RoundTripDone"
    );
    Ok(())
}
