// tests/integration/service_test.rs

//! Event emission: identifiers, per-connection ordering and backpressure.

use super::test_helpers::{TestService, wait_until};
use bytes::Bytes;
use std::collections::HashSet;
use tcp_bridge::config::BridgeConfig;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_two_clients_get_distinct_tagged_events() {
    let mut ts = TestService::start().await;

    let mut a = ts.connect().await;
    a.write_all(b"hello").await.unwrap();
    let event_a = ts.next_event().await;
    assert_eq!(event_a.payload, Bytes::from_static(b"hello"));

    let mut b = ts.connect().await;
    b.write_all(b"world").await.unwrap();
    let event_b = ts.next_event().await;
    assert_eq!(event_b.payload, Bytes::from_static(b"world"));

    assert_ne!(event_a.id, event_b.id);
    assert!(ts.service.is_registered(event_a.id.as_str()));
    assert!(ts.service.is_registered(event_b.id.as_str()));
}

#[tokio::test]
async fn test_identifier_names_the_peer() {
    let mut ts = TestService::start().await;
    let mut client = ts.connect().await;
    let local = client.local_addr().unwrap();
    client.write_all(b"x").await.unwrap();

    let event = ts.next_event().await;
    assert!(
        event.id.as_str().starts_with(&format!("{local}#")),
        "unexpected identifier {}",
        event.id
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_connections_get_unique_identifiers() {
    const CLIENTS: usize = 50;
    let mut ts = TestService::start().await;

    let connects = (0..CLIENTS).map(|_| tokio::net::TcpStream::connect(ts.addr));
    let mut clients = futures::future::join_all(connects).await;
    for (n, client) in clients.iter_mut().enumerate() {
        let client = client.as_mut().unwrap();
        client.write_all(format!("{n}").as_bytes()).await.unwrap();
    }

    let service = ts.service.clone();
    wait_until(|| service.connection_count() == CLIENTS).await;

    let mut ids = HashSet::new();
    let mut seen = 0;
    let expected_bytes: usize = (0..CLIENTS).map(|n| n.to_string().len()).sum();
    while seen < expected_bytes {
        let event = ts.next_event().await;
        seen += event.payload.len();
        ids.insert(event.id);
    }
    assert_eq!(ids.len(), CLIENTS);
}

#[tokio::test]
async fn test_single_connection_preserves_byte_order() {
    let mut ts = TestService::with_config(BridgeConfig {
        read_chunk_size: 7,
        ..BridgeConfig::default()
    })
    .await;

    let mut client = ts.connect().await;
    client.write_all(b"first").await.unwrap();
    let id = ts.next_event().await.id;

    let expected: Vec<u8> = (0..2000).flat_map(|i| format!("msg-{i};").into_bytes()).collect();
    let writer_data = expected.clone();
    let writer = tokio::spawn(async move {
        for chunk in writer_data.chunks(333) {
            client.write_all(chunk).await.unwrap();
        }
        client
    });

    let received = ts.collect_bytes(id.as_str(), expected.len()).await;
    assert_eq!(received, expected);
    drop(writer.await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_clients_each_keep_their_order() {
    let mut ts = TestService::start().await;

    let mut a = ts.connect().await;
    let mut b = ts.connect().await;
    a.write_all(b"A").await.unwrap();
    let id_a = ts.next_event().await.id;
    b.write_all(b"B").await.unwrap();
    let id_b = ts.next_event().await.id;

    let data_a: Vec<u8> = (0..5000u32).flat_map(|i| i.to_be_bytes()).collect();
    let data_b: Vec<u8> = (0..5000u32).rev().flat_map(|i| i.to_be_bytes()).collect();
    let (send_a, send_b) = (data_a.clone(), data_b.clone());
    let task_a = tokio::spawn(async move {
        for chunk in send_a.chunks(1000) {
            a.write_all(chunk).await.unwrap();
        }
        a
    });
    let task_b = tokio::spawn(async move {
        for chunk in send_b.chunks(777) {
            b.write_all(chunk).await.unwrap();
        }
        b
    });

    let mut got_a = Vec::new();
    let mut got_b = Vec::new();
    while got_a.len() < data_a.len() || got_b.len() < data_b.len() {
        let event = ts.next_event().await;
        if event.id == id_a {
            got_a.extend_from_slice(&event.payload);
        } else if event.id == id_b {
            got_b.extend_from_slice(&event.payload);
        }
    }
    assert_eq!(got_a, data_a);
    assert_eq!(got_b, data_b);
    drop(task_a.await.unwrap());
    drop(task_b.await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_output_blocks_without_dropping_data() {
    let mut ts = TestService::with_config(BridgeConfig {
        output_capacity: 1,
        read_chunk_size: 64,
        ..BridgeConfig::default()
    })
    .await;

    let expected: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
    let mut a = ts.connect().await;
    let send = expected.clone();
    let writer = tokio::spawn(async move {
        a.write_all(&send).await.unwrap();
        a
    });

    // Nobody reads the output yet; the accept loop must still make progress.
    let _b = ts.connect().await;
    let _c = ts.connect().await;
    let service = ts.service.clone();
    wait_until(|| service.connection_count() == 3).await;

    // Draining afterwards yields every byte, in order.
    let first = ts.next_event().await;
    let mut received = first.payload.to_vec();
    received.extend(ts.collect_bytes(first.id.as_str(), expected.len() - received.len()).await);
    assert_eq!(received, expected);
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn test_output_as_stream() {
    use futures::StreamExt;

    let TestService {
        service,
        output,
        addr,
        ..
    } = TestService::start().await;
    let mut events = output.into_stream();

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client.write_all(b"streamed").await.unwrap();

    let event = tokio::time::timeout(super::test_helpers::TIMEOUT, events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload, Bytes::from_static(b"streamed"));
    assert!(service.is_registered(event.id.as_str()));
}
