// src/core/errors.rs

//! Defines the primary error type for the bridge.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures surfaced by the library.
/// `std::io::Error` is wrapped in an `Arc` so the whole enum stays cheaply cloneable.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// An identifier was inserted into the registry while already present.
    #[error("Duplicate connection identifier '{0}'")]
    DuplicateIdentifier(String),

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Invalid information packet kind: {0:#04x}")]
    InvalidFrameKind(u8),

    #[error("Information packet of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// A port or internal queue was closed before the expected value arrived.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// The listening socket failed in a way that cannot be recovered.
    #[error("Listener failed: {0}")]
    Listener(String),
}

impl PartialEq for BridgeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BridgeError::Io(e1), BridgeError::Io(e2)) => e1.kind() == e2.kind(),
            (BridgeError::DuplicateIdentifier(a), BridgeError::DuplicateIdentifier(b)) => a == b,
            (BridgeError::InvalidEndpoint(a), BridgeError::InvalidEndpoint(b)) => a == b,
            (BridgeError::InvalidFrameKind(a), BridgeError::InvalidFrameKind(b)) => a == b,
            (
                BridgeError::FrameTooLarge { size: s1, max: m1 },
                BridgeError::FrameTooLarge { size: s2, max: m2 },
            ) => s1 == s2 && m1 == m2,
            (BridgeError::ChannelClosed(a), BridgeError::ChannelClosed(b)) => a == b,
            (BridgeError::Listener(a), BridgeError::Listener(b)) => a == b,
            _ => false,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(Arc::new(e))
    }
}
