// src/core/protocol/ip_frame.rs

//! Implements the information packet (IP) frame carried on message ports and the
//! corresponding `Encoder` and `Decoder` for network communication.
//!
//! Every frame on the wire is a one-byte kind, a 4-byte big-endian payload
//! length and the payload itself.

use crate::core::BridgeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const KIND_PACKET: u8 = 0x00;
const KIND_OPEN_BRACKET: u8 = 0x01;
const KIND_CLOSE_BRACKET: u8 = 0x02;
const HEADER_LEN: usize = 5;

/// Largest payload accepted by default (64MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// A single information packet exchanged over a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpFrame {
    /// Starts a substream (group).
    OpenBracket,
    /// A data-carrying packet.
    Packet(Bytes),
    /// Ends a substream (group).
    CloseBracket,
}

impl IpFrame {
    pub fn packet(data: impl Into<Bytes>) -> Self {
        IpFrame::Packet(data.into())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `IpFrame`s.
#[derive(Debug, Clone)]
pub struct IpFrameCodec {
    max_frame_size: usize,
}

impl Default for IpFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl IpFrameCodec {
    /// Creates a codec accepting payloads up to `max_frame_size` bytes.
    /// The limit is capped at `u32::MAX`, the largest length the header can carry.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(u32::MAX as usize),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Encoder<IpFrame> for IpFrameCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: IpFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (kind, payload) = match item {
            IpFrame::OpenBracket => (KIND_OPEN_BRACKET, Bytes::new()),
            IpFrame::Packet(data) => (KIND_PACKET, data),
            IpFrame::CloseBracket => (KIND_CLOSE_BRACKET, Bytes::new()),
        };
        if payload.len() > self.max_frame_size {
            return Err(BridgeError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        let len = u32::try_from(payload.len()).map_err(|_| BridgeError::FrameTooLarge {
            size: payload.len(),
            max: self.max_frame_size,
        })?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u8(kind);
        dst.put_u32(len);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl Decoder for IpFrameCodec {
    type Item = IpFrame;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = src[0];
        if !matches!(kind, KIND_PACKET | KIND_OPEN_BRACKET | KIND_CLOSE_BRACKET) {
            return Err(BridgeError::InvalidFrameKind(kind));
        }

        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_frame_size {
            return Err(BridgeError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_LEN + len {
            // Wait for the rest of the payload.
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        let frame = match kind {
            KIND_PACKET => IpFrame::Packet(payload),
            KIND_OPEN_BRACKET => IpFrame::OpenBracket,
            _ => IpFrame::CloseBracket,
        };
        Ok(Some(frame))
    }
}
