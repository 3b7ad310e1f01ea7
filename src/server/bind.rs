// src/server/bind.rs

//! Resolves the listen address delivered over the options port and binds the
//! client-facing listener.

use crate::core::BridgeError;
use crate::core::protocol::IpFrame;
use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Waits for the first usable listen address on the options port.
///
/// Only data packets are considered. Empty, non-UTF-8 and unresolvable
/// payloads are logged and skipped; the wait continues. Fails only if the
/// options port closes before a valid address arrives.
pub async fn await_bind_address<S>(options: &mut S) -> Result<SocketAddr, BridgeError>
where
    S: Stream<Item = IpFrame> + Unpin,
{
    while let Some(frame) = options.next().await {
        let IpFrame::Packet(payload) = frame else {
            debug!("Ignoring bracket on the options port.");
            continue;
        };

        let Ok(text) = std::str::from_utf8(&payload) else {
            warn!("Ignoring options packet that is not valid UTF-8.");
            continue;
        };
        let candidate = text.trim();
        if candidate.is_empty() {
            warn!("Ignoring empty options packet.");
            continue;
        }

        match resolve_address(candidate).await {
            Some(addr) => {
                info!("Received listen address {} ({})", candidate, addr);
                return Ok(addr);
            }
            None => warn!("Ignoring invalid listen address '{}'.", candidate),
        }
    }
    Err(BridgeError::ChannelClosed(
        "options port closed before a listen address arrived".to_string(),
    ))
}

/// Resolves `host:port` to the first TCP socket address it names.
pub async fn resolve_address(candidate: &str) -> Option<SocketAddr> {
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Some(addr);
    }
    match tokio::net::lookup_host(candidate).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            debug!("Failed to resolve '{}': {}", candidate, e);
            None
        }
    }
}

/// Binds the client-facing TCP listener.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, BridgeError> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}
