//! End-to-end tests of the replay pipeline.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::net::{UdpSocket, UnixDatagram};
use tokio::task::JoinHandle;

use shadow_replay::config::ReplayConfig;
use shadow_replay::lifecycle::{self, RunSummary, Shutdown, ShutdownReason, StartupError};

mod common;

fn socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("shadow-replay-{}-{}.sock", std::process::id(), name))
}

fn start(config: ReplayConfig, shutdown: Shutdown) -> JoinHandle<Result<RunSummary, StartupError>> {
    tokio::spawn(lifecycle::run(config, shutdown))
}

/// Capture agent stand-in.
async fn agent(path: &Path) -> UnixDatagram {
    let agent = UnixDatagram::unbound().unwrap();
    // Wait for the listener to bind.
    let bound = common::eventually(Duration::from_secs(5), || path.exists()).await;
    assert!(bound, "Listener never bound {}", path.display());
    agent
}

async fn send(agent: &UnixDatagram, path: &Path, frame: &[u8]) {
    let mut attempts = 0;
    while let Err(e) = agent.send_to(frame, path).await {
        attempts += 1;
        assert!(attempts < 50, "Could not reach listener: {e}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn finish(task: JoinHandle<Result<RunSummary, StartupError>>) -> RunSummary {
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("Pipeline did not stop")
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_prefix_rewrite() {
    let backend_addr: SocketAddr = "127.0.0.1:28281".parse().unwrap();
    let upstream = common::start_mock_backend(backend_addr, 200).await;

    let path = socket_path("e2e");
    let mut config = common::replay_config(backend_addr);
    config.transport.unix_socket = path.to_string_lossy().into_owned();
    config.upstream.location_prefix = Some("/v2".into());

    let task = start(config, Shutdown::new());
    let agent = agent(&path).await;
    send(&agent, &path, b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n").await;
    send(&agent, &path, b"").await;

    let summary = finish(task).await;
    assert_eq!(summary.counters.input, 1);
    assert_eq!(summary.counters.forwarded, 1);
    assert_eq!(summary.counters.dropped, 0);
    assert_eq!(summary.counters.parse_errors, 0);
    assert_eq!(summary.counters.upstream_errors, 0);
    assert_eq!(summary.counters.error_statuses, 0);
    assert_eq!(summary.abandoned, 0);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_line, "GET /v2/ping HTTP/1.1");
    assert!(!path.exists(), "Socket file should be removed on stop");
}

#[tokio::test]
async fn test_load_performance() {
    let backend_addr: SocketAddr = "127.0.0.1:28282".parse().unwrap();
    let upstream = common::start_mock_backend(backend_addr, 200).await;

    let path = socket_path("load");
    let mut config = common::replay_config(backend_addr);
    config.transport.unix_socket = path.to_string_lossy().into_owned();
    config.upstream.threads = 4;
    config.traffic.multiplier = 2.0;

    let task = start(config, Shutdown::new());
    let agent = agent(&path).await;

    let frames = 250;
    let start = Instant::now();
    for i in 0..frames {
        let frame = format!("GET /item/{i} HTTP/1.1\r\nHost: x\r\n\r\n");
        send(&agent, &path, frame.as_bytes()).await;
    }
    send(&agent, &path, b"").await;

    let summary = finish(task).await;
    let duration = start.elapsed();
    println!("Replayed {} frames in {:?}", summary.counters.forwarded, duration);

    assert_eq!(summary.counters.input, frames);
    assert_eq!(summary.counters.dropped, 0);
    assert_eq!(summary.counters.forwarded, frames * 2);
    assert_eq!(summary.frames_handled, frames * 2);
    assert_eq!(upstream.requests().len() as u64, frames * 2);
    assert!(upstream.connections() <= 4, "Each worker keeps one connection");
}

#[tokio::test]
async fn test_saturated_backlog_drops_instead_of_blocking() {
    let backend_addr: SocketAddr = "127.0.0.1:28283".parse().unwrap();
    // Slow upstream keeps the single worker busy while frames pile up.
    let upstream = common::start_programmable_backend(backend_addr, |_| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        common::Reply::Status(200)
    })
    .await;

    let path = socket_path("saturate");
    let mut config = common::replay_config(backend_addr);
    config.transport.unix_socket = path.to_string_lossy().into_owned();
    config.backlog.capacity = 10;
    config.backlog.breathing_space = 5;

    let task = start(config, Shutdown::new());
    let agent = agent(&path).await;
    for _ in 0..40 {
        send(&agent, &path, b"GET /burst HTTP/1.1\r\n\r\n").await;
    }
    send(&agent, &path, b"").await;

    let summary = finish(task).await;
    assert_eq!(summary.counters.input, 40);
    assert!(summary.counters.dropped > 0, "Backlog should have shed load");
    assert_eq!(summary.counters.dropped + summary.counters.forwarded, 40);
    assert_eq!(upstream.requests().len() as u64, summary.counters.forwarded);
}

#[tokio::test]
async fn test_signal_abandons_backlog() {
    let backend_addr: SocketAddr = "127.0.0.1:28284".parse().unwrap();
    common::start_programmable_backend(backend_addr, |_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        common::Reply::Status(200)
    })
    .await;

    let path = socket_path("signal");
    let mut config = common::replay_config(backend_addr);
    config.transport.unix_socket = path.to_string_lossy().into_owned();

    let shutdown = Shutdown::new();
    let task = start(config, shutdown.clone());
    let agent = agent(&path).await;
    for _ in 0..20 {
        send(&agent, &path, b"GET /queued HTTP/1.1\r\n\r\n").await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger(ShutdownReason::Signal);

    let summary = finish(task).await;
    assert_eq!(summary.counters.input, 20);
    assert!(summary.abandoned > 0, "Queued frames are not drained after a signal");
    assert!(summary.counters.forwarded < 20);
}

#[tokio::test]
async fn test_counters_flush_to_statsd() {
    let backend_addr: SocketAddr = "127.0.0.1:28285".parse().unwrap();
    common::start_mock_backend(backend_addr, 200).await;
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let path = socket_path("statsd");
    let mut config = common::replay_config(backend_addr);
    config.transport.unix_socket = path.to_string_lossy().into_owned();
    config.observability.statsd = Some(collector.local_addr().unwrap().to_string());

    let task = start(config, Shutdown::new());
    let agent = agent(&path).await;
    send(&agent, &path, b"GET /a HTTP/1.1\r\n\r\n").await;
    // Let the one-second window roll over.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    send(&agent, &path, b"GET /b HTTP/1.1\r\n\r\n").await;

    let mut lines = Vec::new();
    let mut buf = [0u8; 512];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !(lines.iter().any(|l: &String| l.starts_with("shadow.replay.input:"))
        && lines.iter().any(|l| l.starts_with("shadow.replay.backlog:")))
    {
        let n = tokio::time::timeout_at(deadline, collector.recv(&mut buf))
            .await
            .expect("No statsd lines received")
            .unwrap();
        lines.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }

    send(&agent, &path, b"").await;
    finish(task).await;

    assert!(lines.iter().any(|l| l.starts_with("shadow.replay.input:") && l.ends_with("|c")));
    assert!(lines.iter().any(|l| l.starts_with("shadow.replay.backlog:") && l.ends_with("|g")));
}
