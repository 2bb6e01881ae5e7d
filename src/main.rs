//! Shadow traffic replay engine.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                  SHADOW REPLAY                    │
//!   capture agent         │  ┌──────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ──── datagrams ───────┼─▶│ listener │──▶│ amplify  │──▶│ bounded queue│  │
//!                         │  │ (unix)   │   │ + admit  │   │  (drop when  │  │
//!                         │  └──────────┘   └──────────┘   │  saturated)  │  │
//!                         │                                └──────┬───────┘  │
//!                         │                                       ▼          │
//!                         │                               ┌──────────────┐   │
//!   upstream service      │                               │ N workers    │   │
//!   ◀─── HTTP/1.1 ────────┼───────────────────────────────│ parse/rewrite│   │
//!                         │                               │ keep-alive   │   │
//!                         │                               └──────────────┘   │
//!                         │  counters ─▶ log / statsd / Prometheus           │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use shadow_replay::config::{load_config, validate_config, ConfigError, ReplayConfig};
use shadow_replay::lifecycle::{self, signals, Shutdown};
use shadow_replay::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "shadow-replay")]
#[command(about = "Replay captured HTTP traffic against an upstream service", long_about = None)]
struct Cli {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path of the unix datagram socket to read frames from.
    #[arg(long = "socket")]
    unix_socket: Option<String>,

    /// Number of replay workers.
    #[arg(long)]
    threads: Option<usize>,

    /// Address to send HTTP requests to (host[:port]).
    #[arg(long)]
    upstream: Option<String>,

    /// Replay factor: 2 doubles traffic, 0.3 replays 30% of it.
    #[arg(long)]
    multiplier: Option<f64>,

    /// Forward only GET requests.
    #[arg(long)]
    only_get: bool,

    /// Prefix prepended to every forwarded URL.
    #[arg(long)]
    location_prefix: Option<String>,

    /// Host header sent upstream.
    #[arg(long)]
    host_header: Option<String>,

    /// Maximum forwarded requests per second (0 = unlimited).
    #[arg(long)]
    rate_limit: Option<u32>,

    /// host:port of statsd.
    #[arg(long)]
    statsd: Option<String>,

    /// Prefix for statsd metric names.
    #[arg(long)]
    statsd_prefix: Option<String>,

    /// Size of the backlog queue.
    #[arg(long)]
    backlog: Option<usize>,

    /// Backlog breathing space.
    #[arg(long)]
    backlog_breathing_space: Option<usize>,

    /// Log level (DEBUG, INFO, WARNING, ERROR).
    #[arg(long)]
    loglevel: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ReplayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ReplayConfig::default(),
        };

        if let Some(v) = self.unix_socket {
            config.transport.unix_socket = v;
        }
        if let Some(v) = self.threads {
            config.upstream.threads = v;
        }
        if let Some(v) = self.upstream {
            config.upstream.address = v;
        }
        if let Some(v) = self.multiplier {
            config.traffic.multiplier = v;
        }
        if self.only_get {
            config.upstream.only_get = true;
        }
        if let Some(v) = self.location_prefix {
            config.upstream.location_prefix = Some(v);
        }
        if let Some(v) = self.host_header {
            config.upstream.host_header = Some(v);
        }
        if let Some(v) = self.rate_limit {
            config.upstream.rate_limit = v;
        }
        if let Some(v) = self.statsd {
            config.observability.statsd = Some(v);
        }
        if let Some(v) = self.statsd_prefix {
            config.observability.statsd_prefix = v;
        }
        if let Some(v) = self.backlog {
            config.backlog.capacity = v;
        }
        if let Some(v) = self.backlog_breathing_space {
            config.backlog.breathing_space = v;
        }
        if let Some(v) = self.loglevel {
            config.observability.log_level = v;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!("shadow-replay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        socket = %config.transport.unix_socket,
        upstream = %config.upstream.address,
        threads = config.upstream.threads,
        multiplier = config.traffic.multiplier,
        backlog = config.backlog.capacity,
        breathing_space = config.backlog.breathing_space,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signal_task = signals::forward_signals(shutdown.clone());

    let summary = lifecycle::run(config, shutdown).await?;
    signal_task.abort();

    tracing::info!(
        input = summary.counters.input,
        dropped = summary.counters.dropped,
        forwarded = summary.counters.forwarded,
        parse_errors = summary.counters.parse_errors,
        "Shutdown complete"
    );
    Ok(())
}
