// src/core/protocol/mod.rs

pub mod group;
pub mod ip_frame;
pub use group::{GroupAssembler, encode_event};
pub use ip_frame::{DEFAULT_MAX_FRAME_SIZE, IpFrame, IpFrameCodec};
