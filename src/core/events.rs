// src/core/events.rs

//! The records that flow through the bridge: identifiers, inbound events and
//! addressed write commands.

use bytes::Bytes;
use std::borrow::Borrow;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// An opaque token naming one live connection.
///
/// Identifiers are minted by the service as `<peer addr>#<sequence>`, where the
/// sequence is a service-wide monotonic counter. The peer address alone is not
/// enough: a client reconnecting from the same port would collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Mints the identifier for the `seq`-th connection accepted from `addr`.
    pub fn for_peer(addr: SocketAddr, seq: u64) -> Self {
        Self(Arc::from(format!("{addr}#{seq}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// One chunk read from a connection, tagged with the connection's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub id: ConnectionId,
    pub payload: Bytes,
}

/// A request to deliver `payload` to whichever connection is registered as `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCommand {
    pub id: String,
    pub payload: Bytes,
}
