// tests/property/ordering_test.rs

//! Per-connection byte order holds for any write pattern and chunk size.

use crate::test_helpers::TestService;
use proptest::prelude::*;
use tcp_bridge::config::BridgeConfig;
use tokio::io::AsyncWriteExt;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_concatenated_events_equal_bytes_sent(
        writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..2048), 1..20),
        read_chunk_size in 1usize..4096,
        output_capacity in 1usize..8,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut ts = TestService::with_config(BridgeConfig {
                read_chunk_size,
                output_capacity,
                ..BridgeConfig::default()
            })
            .await;

            let mut client = ts.connect().await;
            let expected: Vec<u8> = writes.concat();
            let writer = tokio::spawn(async move {
                for chunk in &writes {
                    client.write_all(chunk).await.unwrap();
                }
                client
            });

            let first = ts.next_event().await;
            assert!(first.payload.len() <= read_chunk_size);
            let mut received = first.payload.to_vec();
            if received.len() < expected.len() {
                let rest = ts
                    .collect_bytes(first.id.as_str(), expected.len() - received.len())
                    .await;
                received.extend(rest);
            }
            assert_eq!(received, expected);
            drop(writer.await.unwrap());
        });
    }
}
