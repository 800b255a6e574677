//! FramedEndpoint behaviour over loopback TCP.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::read_frames;
use http_cloak::framing::{Mode, TransferBuffer, HANDSHAKE_PROBE};
use http_cloak::{ConfigurationError, DialTarget, EndpointError, FramedEndpoint, RetryPolicy};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn refused_connect_is_a_configuration_error() {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let err = FramedEndpoint::connect(&DialTarget::new("127.0.0.1", port), Mode::Raw, CONNECT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, EndpointError::Configuration(ConfigurationError::Connect { .. })));
}

#[tokio::test]
async fn oversized_host_is_rejected_before_dialing() {
    let target = DialTarget::new("x".repeat(300), 80);
    let err = FramedEndpoint::connect(&target, Mode::Disguised, CONNECT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EndpointError::Configuration(ConfigurationError::PreambleTooLong { .. })
    ));
}

#[tokio::test]
async fn dialed_endpoint_frames_and_handshakes() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let (mut socket, _) = server.accept().await.unwrap();
        let mut probe = [0u8; 18];
        socket.read_exact(&mut probe).await.unwrap();
        socket.write_all(&probe).await.unwrap();
        let content = read_frames(&mut socket, 4).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length:2\r\n\r\nok")
            .await
            .unwrap();
        (probe, content)
    });

    let target = DialTarget::new("127.0.0.1", addr.port());
    let mut endpoint = FramedEndpoint::connect(&target, Mode::Disguised, CONNECT_TIMEOUT)
        .await
        .unwrap();
    let policy = RetryPolicy::new(Duration::from_millis(20), 50);
    endpoint.handshake(&policy).await.unwrap();

    let mut buf = TransferBuffer::new(1024);
    buf.put(0, b"ping").unwrap();
    assert_eq!(endpoint.send(&buf, 0, 4, &policy).await.unwrap(), 4);

    let received = loop {
        if let Some(received) = endpoint.receive(&mut buf, 0, &policy).await.unwrap() {
            break received;
        }
    };
    assert_eq!(buf.get(received.start(), received.len()).unwrap(), b"ok");

    let (probe, content) = peer.await.unwrap();
    assert_eq!(&probe, HANDSHAKE_PROBE);
    assert_eq!(content, b"ping");

    endpoint.close().await;
    assert!(endpoint.is_closed());
}
