//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use http_cloak::config::{IoConfig, ListenerConfig, RemoteConfig};
use http_cloak::framing::{find_header_end, parse_content_length, Mode};
use http_cloak::net::{Listener, ListenerError};
use http_cloak::relay::SessionTracker;
use http_cloak::{Shutdown, TunnelConfig, TunnelServer};

/// Start a backend that echoes every byte it receives.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Config for a tunnel on an ephemeral local port forwarding to `remote`.
pub fn tunnel_config(remote: SocketAddr, listen_mode: Mode, remote_mode: Mode) -> TunnelConfig {
    TunnelConfig {
        listener: ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            mode: listen_mode,
            ..ListenerConfig::default()
        },
        remote: RemoteConfig {
            host: remote.ip().to_string(),
            port: remote.port(),
            mode: remote_mode,
            connect_timeout_secs: 1,
            connect_attempts: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
            ..RemoteConfig::default()
        },
        io: IoConfig {
            send_wait_ms: 20,
            send_max_retries: 50,
            ..IoConfig::default()
        },
        ..TunnelConfig::default()
    }
}

/// A tunnel instance running in the background.
pub struct RunningTunnel {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: SessionTracker,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

pub async fn start_tunnel(config: TunnelConfig) -> RunningTunnel {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = TunnelServer::new(config);
    let tracker = server.tracker();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));
    RunningTunnel {
        addr,
        shutdown,
        tracker,
        handle,
    }
}

/// Read exactly `len` bytes or fail the test after a few seconds.
pub async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for data")
        .unwrap();
    buf
}

/// Read disguised frames until `len` content bytes have arrived.
/// Returns the concatenated content.
pub async fn read_frames(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    let mut content = Vec::new();
    let mut chunk = [0u8; 1024];

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while content.len() < len {
        // Drain every complete frame already buffered.
        while let Some(end) = find_header_end(&wire) {
            let declared = parse_content_length(&wire[..end]).unwrap();
            if wire.len() < end + declared {
                break;
            }
            content.extend_from_slice(&wire[end..end + declared]);
            wire.drain(..end + declared);
        }
        if content.len() >= len {
            break;
        }
        let n = tokio::time::timeout_at(deadline, stream.read(&mut chunk))
            .await
            .expect("timed out waiting for frames")
            .unwrap();
        assert!(n > 0, "peer closed before all frames arrived");
        wire.extend_from_slice(&chunk[..n]);
    }
    content
}

/// Wrap `payload` the way a dialing endpoint would.
pub fn request_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = format!(
        "GET  / HTTP/1.0\r\nHost: test:1\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    frame.extend_from_slice(payload);
    frame
}
