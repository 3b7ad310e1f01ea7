// tests/property/framing_test.rs

//! Properties of the IP codec and the group assembler under arbitrary input
//! splitting and malformed interleavings.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tcp_bridge::core::events::OutboundEvent;
use tcp_bridge::core::protocol::{GroupAssembler, IpFrame, IpFrameCodec, encode_event};
use tcp_bridge::core::{ConnectionId, DispatchCommand};
use tokio_util::codec::{Decoder, Encoder};

fn arb_frame() -> impl Strategy<Value = IpFrame> {
    prop_oneof![
        Just(IpFrame::OpenBracket),
        Just(IpFrame::CloseBracket),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|data| IpFrame::Packet(Bytes::from(data))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    /// However the byte stream is split, the decoder yields the same frames.
    #[test]
    fn test_decoder_is_split_invariant(
        frames in prop::collection::vec(arb_frame(), 1..20),
        split in 1usize..17,
    ) {
        let mut codec = IpFrameCodec::default();
        let mut wire = BytesMut::new();
        for frame in frames.iter().cloned() {
            codec.encode(frame, &mut wire).unwrap();
        }

        let mut decoded = Vec::new();
        let mut buf = BytesMut::new();
        for chunk in wire.chunks(split) {
            buf.extend_from_slice(chunk);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }
        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, frames);
    }

    /// Well-formed groups always come back out as the command they encode,
    /// even when stray packets and closes precede them.
    #[test]
    fn test_well_formed_groups_survive_noise(
        groups in prop::collection::vec(
            ("[a-zA-Z0-9.:#]{1,40}", prop::collection::vec(any::<u8>(), 0..256)),
            1..10,
        ),
        noise in prop::collection::vec(
            prop_oneof![
                Just(IpFrame::CloseBracket),
                prop::collection::vec(any::<u8>(), 0..8).prop_map(|data| IpFrame::Packet(Bytes::from(data))),
            ],
            0..4,
        ),
    ) {
        let mut assembler = GroupAssembler::new();
        let mut commands = Vec::new();

        for (id, payload) in &groups {
            for frame in noise.iter().cloned() {
                prop_assert!(assembler.push(frame).is_none());
            }
            let event = OutboundEvent {
                id: ConnectionId::from(id.as_str()),
                payload: Bytes::from(payload.clone()),
            };
            for frame in encode_event(event) {
                if let Some(command) = assembler.push(frame) {
                    commands.push(command);
                }
            }
            prop_assert!(!assembler.in_group());
        }

        let expected: Vec<DispatchCommand> = groups
            .iter()
            .map(|(id, payload)| DispatchCommand {
                id: id.clone(),
                payload: Bytes::from(payload.clone()),
            })
            .collect();
        prop_assert_eq!(commands, expected);
    }

    /// Arbitrary frame sequences never panic and never yield a command with
    /// an empty identifier.
    #[test]
    fn test_assembler_accepts_any_sequence(
        frames in prop::collection::vec(arb_frame(), 0..64),
    ) {
        let mut assembler = GroupAssembler::new();
        for frame in frames {
            if let Some(command) = assembler.push(frame) {
                prop_assert!(!command.id.is_empty());
            }
        }
    }
}
