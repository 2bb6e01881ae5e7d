//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the replay
//! engine. All types derive Serde traits for deserialization from config files.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration for the replay engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReplayConfig {
    /// Local transport the capture agent writes frames to.
    pub transport: TransportConfig,

    /// Upstream target and request rewriting.
    pub upstream: UpstreamConfig,

    /// Amplification / sampling of captured traffic.
    pub traffic: TrafficConfig,

    /// Handoff queue sizing and load shedding.
    pub backlog: BacklogConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Local transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Filesystem path of the unix datagram socket.
    pub unix_socket: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            unix_socket: "/tmp/mysock.dgram.0".to_string(),
        }
    }
}

/// Upstream target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address as `host[:port]` (port defaults to 80).
    pub address: String,

    /// Number of replay workers, each with its own connection.
    pub threads: usize,

    /// Forward only GET requests.
    pub only_get: bool,

    /// Prefix prepended to every forwarded URL.
    pub location_prefix: Option<String>,

    /// Override for the forwarded Host header.
    pub host_header: Option<String>,

    /// Maximum forwarded requests per second across all workers (0 = unlimited).
    pub rate_limit: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            threads: 1,
            only_get: false,
            location_prefix: None,
            host_header: None,
            rate_limit: 0,
        }
    }
}

/// Traffic multiplication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Replay factor: 2.0 doubles traffic, 0.3 samples 30% of it.
    pub multiplier: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

/// Backlog queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BacklogConfig {
    /// Maximum number of frames waiting for a worker.
    pub capacity: usize,

    /// Margin below `capacity` at which the listener starts dropping.
    pub breathing_space: usize,
}

impl BacklogConfig {
    /// Queue depth above which admission attempts are dropped.
    pub fn len_limit(&self) -> usize {
        self.capacity.saturating_sub(self.breathing_space)
    }
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            capacity: 30_000,
            breathing_space: 500,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Statsd address (`host:port`); counters are only logged when unset.
    pub statsd: Option<String>,

    /// Prefix placed before every statsd metric name.
    pub statsd_prefix: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            statsd: None,
            statsd_prefix: "shadow.replay".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A parsed `host[:port]` upstream address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    pub const DEFAULT_PORT: u16 = 80;

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`, optionally behind `http://`.
    pub fn parse(raw: &str) -> Result<Self, UpstreamAddressError> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix("http://")
            .unwrap_or(raw)
            .trim_end_matches('/');
        if raw.is_empty() {
            return Err(UpstreamAddressError::Empty);
        }
        if raw.contains('/') {
            return Err(UpstreamAddressError::Malformed(raw.to_string()));
        }

        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| UpstreamAddressError::Malformed(raw.to_string()))?;
            match tail {
                "" => (host, None),
                tail => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(UpstreamAddressError::Malformed(raw.to_string())),
                },
            }
        } else {
            match raw.split_once(':') {
                // More than one colon outside brackets is an unbracketed IPv6 literal.
                Some((_, port)) if port.contains(':') => {
                    return Err(UpstreamAddressError::Malformed(raw.to_string()))
                }
                Some((host, port)) => (host, Some(port)),
                None => (raw, None),
            }
        };

        if host.is_empty() {
            return Err(UpstreamAddressError::Empty);
        }
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| UpstreamAddressError::InvalidPort(port.to_string()))?,
            None => Self::DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Value used for the `Host` header when no override is configured.
    pub fn authority(&self) -> String {
        if self.port == Self::DEFAULT_PORT {
            self.bracketed_host()
        } else {
            self.to_string()
        }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bracketed_host(), self.port)
    }
}

/// Reasons an upstream address fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamAddressError {
    #[error("upstream address is empty")]
    Empty,
    #[error("invalid upstream port `{0}`")]
    InvalidPort(String),
    #[error("malformed upstream address `{0}`")]
    Malformed(String),
}
