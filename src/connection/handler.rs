// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::handle::ConnectionHandle;
use crate::core::metrics;
use crate::core::{ConnectionRegistry, OutboundEvent};
use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why a handler's read loop ended.
#[derive(Debug)]
pub enum ExitReason {
    /// The peer closed its side of the connection.
    PeerClosed,
    /// A read failed.
    ReadError(std::io::Error),
    /// The connection was cancelled by a failed dispatch or by service shutdown.
    Cancelled,
    /// Nobody consumes the output stream any more.
    OutputClosed,
}

/// Services exactly one accepted connection: reads chunks, emits them as
/// events, and tears the connection down on exit.
pub struct ConnectionHandler {
    reader: OwnedReadHalf,
    handle: Arc<ConnectionHandle>,
    registry: Arc<ConnectionRegistry>,
    events: mpsc::Sender<OutboundEvent>,
    chunk_size: usize,
}

impl ConnectionHandler {
    /// Creates a handler for a connection already inserted into `registry`.
    pub fn new(
        reader: OwnedReadHalf,
        handle: Arc<ConnectionHandle>,
        registry: Arc<ConnectionRegistry>,
        events: mpsc::Sender<OutboundEvent>,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            handle,
            registry,
            events,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Runs the read loop until EOF, error or cancellation, then deregisters
    /// the connection and closes its socket, in that order.
    pub async fn run(mut self) -> ExitReason {
        let guard = ConnectionGuard::new(
            self.registry.clone(),
            self.handle.id().clone(),
            self.handle.addr(),
        );

        let reason = self.read_loop().await;
        match &reason {
            ExitReason::PeerClosed => debug!("Connection {} closed by peer.", self.handle.id()),
            ExitReason::ReadError(e) if is_normal_disconnect(e) => {
                debug!("Connection {} closed by peer: {}", self.handle.id(), e)
            }
            ExitReason::ReadError(e) => warn!("Read error on connection {}: {}", self.handle.id(), e),
            ExitReason::Cancelled => debug!("Connection {} cancelled.", self.handle.id()),
            ExitReason::OutputClosed => {
                warn!("Output stream dropped, closing connection {}.", self.handle.id())
            }
        }

        // Closing: no dispatch may reach this connection from here on.
        self.handle.begin_close();
        drop(guard);
        self.handle.close().await;
        info!("Connection {} closed.", self.handle.id());
        reason
    }

    async fn read_loop(&mut self) -> ExitReason {
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        loop {
            buf.reserve(self.chunk_size);
            // A single read never yields more than `chunk_size` bytes.
            let mut space = (&mut buf).limit(self.chunk_size);
            let read = tokio::select! {
                biased;
                _ = self.handle.cancelled() => return ExitReason::Cancelled,
                res = self.reader.read_buf(&mut space) => res,
            };

            match read {
                Ok(0) => return ExitReason::PeerClosed,
                Ok(n) => {
                    metrics::BYTES_RECEIVED_TOTAL.inc_by(n as f64);
                    let event = OutboundEvent {
                        id: self.handle.id().clone(),
                        payload: buf.split().freeze(),
                    };
                    // Blocks while the output queue is full; cancellation still wins.
                    tokio::select! {
                        biased;
                        _ = self.handle.cancelled() => return ExitReason::Cancelled,
                        sent = self.events.send(event) => {
                            if sent.is_err() {
                                return ExitReason::OutputClosed;
                            }
                            metrics::EVENTS_EMITTED_TOTAL.inc();
                        }
                    }
                }
                Err(e) => return ExitReason::ReadError(e),
            }
        }
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    )
}
