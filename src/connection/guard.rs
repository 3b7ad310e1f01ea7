// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::{ConnectionId, ConnectionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard that deregisters a connection when its handler's scope is
/// exited, including by panic or task abort.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(registry: Arc<ConnectionRegistry>, id: ConnectionId, addr: SocketAddr) -> Self {
        Self { registry, id, addr }
    }
}

impl Drop for ConnectionGuard {
    /// Removes the connection from the registry. Dispatches that look the
    /// identifier up afterwards find nothing.
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, deregistering {} ({})",
            self.id, self.addr
        );

        if self.registry.remove(self.id.as_str()).is_none() {
            debug!(
                "Connection {} was already deregistered (closed by a failed dispatch).",
                self.id
            );
        }
    }
}
