// src/core/mod.rs

//! Building blocks shared by the connection handlers and the service: identifiers,
//! the connection registry, the port protocol, errors and metrics.

pub mod component;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod protocol;
pub mod registry;

pub use errors::BridgeError;
pub use events::{ConnectionId, DispatchCommand, OutboundEvent};
pub use registry::ConnectionRegistry;
