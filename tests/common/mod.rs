//! Shared utilities for integration and pipeline testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use shadow_replay::config::ReplayConfig;

/// What the mock upstream does with one request.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Answer with this status and keep the connection open.
    Status(u16),
    /// Close the connection without answering.
    Hangup,
}

/// One request as the mock upstream saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request_line: String,
    /// Lowercased names.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Handle on a running mock upstream.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub connections: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockUpstream {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a keep-alive mock upstream that answers every request with `status`.
#[allow(dead_code)]
pub async fn start_mock_backend(addr: SocketAddr, status: u16) -> MockUpstream {
    start_programmable_backend(addr, move |_| async move { Reply::Status(status) }).await
}

/// Start a programmable mock upstream.
///
/// `f` gets the zero-based index of the request across all connections.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F) -> MockUpstream
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let upstream = MockUpstream {
        addr,
        requests: Arc::new(Mutex::new(Vec::new())),
        connections: Arc::new(AtomicUsize::new(0)),
    };
    let f = Arc::new(f);
    let seen = Arc::new(AtomicUsize::new(0));

    let state = upstream.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            state.connections.fetch_add(1, Ordering::SeqCst);
            let f = f.clone();
            let seen = seen.clone();
            let requests = state.requests.clone();
            tokio::spawn(async move {
                serve_connection(socket, f, seen, requests).await;
            });
        }
    });

    upstream
}

async fn serve_connection<F, Fut>(
    mut socket: TcpStream,
    f: Arc<F>,
    seen: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
) where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let mut pending = Vec::new();
    loop {
        let Some(recorded) = read_request(&mut socket, &mut pending).await else {
            return;
        };
        requests.lock().unwrap().push(recorded);

        let index = seen.fetch_add(1, Ordering::SeqCst);
        let status = match f(index).await {
            Reply::Status(status) => status,
            Reply::Hangup => {
                let _ = socket.shutdown().await;
                return;
            }
        };

        let body = format!("status {status}");
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n{}",
            status,
            reason(status),
            body.len(),
            body
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_request(socket: &mut TcpStream, pending: &mut Vec<u8>) -> Option<Recorded> {
    let mut buf = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        pending.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&pending[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while pending.len() < body_start + content_length {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        pending.extend_from_slice(&buf[..n]);
    }
    let body = pending[body_start..body_start + content_length].to_vec();
    pending.drain(..body_start + content_length);

    Some(Recorded {
        request_line,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Config pointing at `upstream` with short deadlines.
#[allow(dead_code)]
pub fn replay_config(upstream: SocketAddr) -> ReplayConfig {
    let mut config = ReplayConfig::default();
    config.upstream.address = upstream.to_string();
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 2;
    config
}

/// Poll `check` until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
