// tests/integration/lifecycle_test.rs

//! Connection teardown and service shutdown.

use super::test_helpers::{TIMEOUT, TestService, wait_until};
use bytes::Bytes;
use std::time::Duration;
use tcp_bridge::config::BridgeConfig;
use tcp_bridge::server::DispatchOutcome;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_rapid_connect_close_leaves_no_entries() {
    let ts = TestService::start().await;

    for _ in 0..100 {
        let client = ts.connect().await;
        drop(client);
    }

    let service = ts.service.clone();
    wait_until(|| service.connection_count() == 0).await;
}

#[tokio::test]
async fn test_peer_close_deregisters_before_socket_is_released() {
    let mut ts = TestService::start().await;
    let mut client = ts.connect().await;
    client.write_all(b"ping").await.unwrap();
    let id = ts.next_event().await.id;

    client.shutdown().await.unwrap();

    // The service closes its side in response; by then the id is gone.
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(TIMEOUT, client.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert!(!ts.service.is_registered(id.as_str()));
}

#[tokio::test]
async fn test_shutdown_closes_every_connection() {
    let mut ts = TestService::start().await;

    let mut clients = Vec::new();
    for n in 0..3 {
        let mut client = ts.connect().await;
        client.write_all(format!("client {n}").as_bytes()).await.unwrap();
        let _ = ts.next_event().await;
        clients.push(client);
    }
    assert_eq!(ts.service.connection_count(), 3);

    ts.service.shutdown();
    assert!(ts.service.is_shutting_down());

    let served = tokio::time::timeout(TIMEOUT, &mut ts.serve_task)
        .await
        .expect("serve did not return after shutdown")
        .unwrap();
    assert!(served.is_ok());
    assert_eq!(ts.service.connection_count(), 0);

    for client in clients.iter_mut() {
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(TIMEOUT, client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0, "client should observe EOF");
    }

    // The listener has been released.
    assert!(TcpStream::connect(ts.addr).await.is_err());
}

#[tokio::test]
async fn test_dispatch_after_shutdown_is_not_found() {
    let mut ts = TestService::start().await;
    let mut client = ts.connect().await;
    client.write_all(b"hi").await.unwrap();
    let id = ts.next_event().await.id;

    ts.service.shutdown();
    let _ = tokio::time::timeout(TIMEOUT, &mut ts.serve_task).await.unwrap();

    assert_eq!(
        ts.service.dispatch(id.as_str(), Bytes::from_static(b"late")).await,
        DispatchOutcome::NotFound
    );
}

#[tokio::test]
async fn test_dropped_output_closes_connections_on_next_data() {
    let ts = TestService::start().await;
    let TestService {
        service,
        output,
        addr,
        ..
    } = ts;
    drop(output);

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"nobody listens").await.unwrap();

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(TIMEOUT, client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
    wait_until(|| service.connection_count() == 0).await;
}

#[tokio::test]
async fn test_connection_limit_rejects_extra_clients() {
    let mut ts = TestService::with_config(BridgeConfig {
        max_connections: 1,
        ..BridgeConfig::default()
    })
    .await;

    let mut first = ts.connect().await;
    first.write_all(b"one").await.unwrap();
    let _ = ts.next_event().await;

    let mut second = ts.connect().await;
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(TIMEOUT, second.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0, "over-limit connection should be closed");
    assert_eq!(ts.service.connection_count(), 1);

    // Freeing the slot admits the next client.
    drop(first);
    let service = ts.service.clone();
    wait_until(|| service.connection_count() == 0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut third = ts.connect().await;
    third.write_all(b"three").await.unwrap();
    let event = ts.next_event().await;
    assert_eq!(event.payload, Bytes::from_static(b"three"));
}

#[tokio::test]
async fn test_shutdown_interrupts_dispatch_to_stalled_reader() {
    let mut ts = TestService::start().await;
    let mut client = ts.connect().await;
    client.write_all(b"never reads").await.unwrap();
    let id = ts.next_event().await.id;

    // No write timeout is configured and the client never reads, so this
    // write stalls once the socket buffers are full.
    let service = ts.service.clone();
    let dispatch = tokio::spawn(async move {
        service
            .dispatch(id.as_str(), Bytes::from(vec![0u8; 64 * 1024 * 1024]))
            .await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!dispatch.is_finished());

    ts.service.shutdown();
    let outcome = tokio::time::timeout(Duration::from_secs(1), dispatch)
        .await
        .expect("dispatch still blocked after shutdown")
        .unwrap();
    assert_ne!(outcome, DispatchOutcome::Delivered);

    let served = tokio::time::timeout(Duration::from_secs(1), &mut ts.serve_task)
        .await
        .expect("serve waited on the stalled write")
        .unwrap();
    assert!(served.is_ok());
    assert_eq!(ts.service.connection_count(), 0);

    // The socket is really closed: draining the buffered bytes ends in EOF.
    let mut sink = Vec::new();
    let drained = tokio::time::timeout(TIMEOUT, client.read_to_end(&mut sink)).await;
    assert!(drained.is_ok(), "client socket was left open");
}
