// src/connection/handle.rs

//! Defines `ConnectionHandle`, the registry's view of one accepted socket.

use crate::core::ConnectionId;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Write side and lifecycle state of one accepted connection.
///
/// The read half belongs to the connection's handler task; this handle is what
/// the registry stores and what `dispatch` writes through.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    addr: SocketAddr,
    /// `None` once the socket has been shut down.
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Creates an `Open` handle. `cancel` stops the handler's read loop.
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        writer: OwnedWriteHalf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            addr,
            writer: Mutex::new(Some(writer)),
            state: AtomicU8::new(ConnectionState::Open as u8),
            cancel,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Moves `Open -> Closing` and stops the read loop.
    /// Returns false if the connection was already closing or closed.
    pub fn begin_close(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.cancel.cancel();
        transitioned
    }

    /// Resolves once the connection has been asked to stop, either by
    /// `begin_close` or by service shutdown.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Writes `payload` to the peer. Returns `Ok(false)` if the connection has
    /// left the `Open` state, either before the write or while it was blocked.
    ///
    /// The per-connection writer lock is held for the duration of the write so
    /// that a concurrent `close` cannot shut the socket down mid-payload.
    /// Cancellation releases the lock at once, so a peer that stops reading
    /// never holds up `close`.
    pub async fn write(&self, payload: &[u8], timeout: Option<Duration>) -> io::Result<bool> {
        let mut writer = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(false),
            writer = self.writer.lock() => writer,
        };
        let Some(stream) = writer.as_mut() else {
            return Ok(false);
        };
        if !self.is_open() {
            return Ok(false);
        }

        let send = async {
            stream.write_all(payload).await?;
            stream.flush().await
        };
        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, send).await {
                    Ok(res) => res,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "write to client timed out",
                    )),
                },
                None => send.await,
            }
        };
        tokio::select! {
            biased;
            // The payload may be cut short; the connection is closing anyway.
            _ = self.cancel.cancelled() => Ok(false),
            res = bounded => res.map(|()| true),
        }
    }

    /// Shuts the write side down and marks the handle `Closed`.
    /// Idempotent: later calls find no writer and only re-assert the state.
    pub async fn close(&self) {
        self.state
            .fetch_max(ConnectionState::Closing as u8, Ordering::AcqRel);
        self.cancel.cancel();

        if let Some(mut stream) = self.writer.lock().await.take() {
            // The peer may already be gone; a failed FIN is not interesting.
            let _ = stream.shutdown().await;
        }
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }
}
