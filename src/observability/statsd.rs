//! External metrics sink.
//!
//! Counters flush into a [`MetricsSink`] once per second. The only wire
//! implementation is a fire-and-forget statsd client: datagrams go straight to
//! a non-blocking socket, so an absent or slow collector never stalls the
//! caller.

use std::fmt::Write as _;

use rand::Rng;
use tokio::net::UdpSocket;

/// Receiver of counter increments and gauges.
///
/// Implementations must not block and must swallow their own failures.
pub trait MetricsSink: Send + Sync {
    /// Increment `name` by `value`, sampled at `sample_rate` (0.0..=1.0).
    fn incr(&self, name: &str, value: u64, sample_rate: f32);

    /// Report an absolute value for `name`.
    fn gauge(&self, name: &str, value: u64);
}

/// Error raised while setting up the statsd socket.
#[derive(Debug, thiserror::Error)]
#[error("statsd socket for {addr}: {source}")]
pub struct StatsdError {
    addr: String,
    #[source]
    source: std::io::Error,
}

/// UDP statsd client.
#[derive(Debug)]
pub struct StatsdSink {
    /// Non-blocking and not registered with the runtime.
    socket: std::net::UdpSocket,
    prefix: String,
}

impl StatsdSink {
    /// Bind an ephemeral local port and connect it to `addr` (`host:port`).
    pub async fn connect(addr: &str, prefix: &str) -> Result<Self, StatsdError> {
        let wrap = |source| StatsdError {
            addr: addr.to_string(),
            source,
        };
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(wrap)?;
        socket.connect(addr).await.map_err(wrap)?;
        let socket = socket.into_std().map_err(wrap)?;
        socket.set_nonblocking(true).map_err(wrap)?;

        tracing::info!(statsd = %addr, prefix = %prefix, "Statsd sink connected");
        Ok(Self {
            socket,
            prefix: prefix.trim_end_matches('.').to_string(),
        })
    }

    fn submit(&self, name: &str, value: &str, sample_rate: f32) {
        let sampled = sample_rate < 1.0;
        if sampled && rand::thread_rng().gen::<f32>() >= sample_rate {
            return;
        }

        let line = format_line(&self.prefix, name, value, sampled.then_some(sample_rate));
        if let Err(e) = self.socket.send(line.as_bytes()) {
            tracing::trace!(metric = %name, error = %e, "Statsd send failed");
        }
    }
}

impl MetricsSink for StatsdSink {
    fn incr(&self, name: &str, value: u64, sample_rate: f32) {
        self.submit(name, &format!("{value}|c"), sample_rate);
    }

    fn gauge(&self, name: &str, value: u64) {
        self.submit(name, &format!("{value}|g"), 1.0);
    }
}

/// Render one statsd line: `prefix.name:value[|@rate]`.
fn format_line(prefix: &str, name: &str, value: &str, sample_rate: Option<f32>) -> String {
    let mut line = String::with_capacity(prefix.len() + name.len() + value.len() + 12);
    if !prefix.is_empty() {
        line.push_str(prefix);
        line.push('.');
    }
    line.push_str(name);
    line.push(':');
    line.push_str(value);
    if let Some(rate) = sample_rate {
        let _ = write!(line, "|@{rate}");
    }
    line
}
