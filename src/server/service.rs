// src/server/service.rs

//! The connection multiplexing service: owns the registry, merges every
//! handler's events into one output queue, and routes addressed writes.

use super::connection_loop;
use crate::config::BridgeConfig;
use crate::core::metrics;
use crate::core::{BridgeError, ConnectionRegistry, OutboundEvent};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State shared between the accept loop, the handlers and `dispatch`.
pub(crate) struct ServiceState {
    pub(crate) config: BridgeConfig,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) events_tx: mpsc::Sender<OutboundEvent>,
    pub(crate) next_seq: AtomicU64,
    /// Parent of every connection's cancellation token.
    pub(crate) shutdown: CancellationToken,
    pub(crate) connection_permits: Arc<Semaphore>,
}

/// What happened to a dispatched payload. Purely informational: none of these
/// outcomes is a failure of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The payload was written to the connection's socket.
    Delivered,
    /// No open connection is registered under the identifier.
    NotFound,
    /// The write failed; the connection is being closed.
    WriteFailed,
}

/// Handle to the multiplexing service. Cheap to clone; every clone drives the
/// same registry and output queue.
#[derive(Clone)]
pub struct Service {
    state: Arc<ServiceState>,
}

/// The merged stream of events from every connection.
///
/// Per-connection order is preserved; events from different connections may
/// interleave arbitrarily. The queue is bounded by `output_capacity`: when it
/// is full, handlers wait (they never drop data), while accepting and dispatch
/// carry on unaffected.
#[derive(Debug)]
pub struct Output {
    rx: mpsc::Receiver<OutboundEvent>,
}

impl Output {
    /// Waits for the next event. Returns `None` once every `Service` clone is gone.
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<OutboundEvent> {
        ReceiverStream::new(self.rx)
    }
}

impl Service {
    /// Creates the service and the single consumer end of its output.
    pub fn new(config: BridgeConfig) -> (Self, Output) {
        let (events_tx, rx) = mpsc::channel(config.output_capacity.max(1));
        let permits = config.max_connections.max(1);
        let state = ServiceState {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            events_tx,
            next_seq: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            connection_permits: Arc::new(Semaphore::new(permits)),
        };
        (
            Self {
                state: Arc::new(state),
            },
            Output { rx },
        )
    }

    /// Accepts connections on `listener` until shutdown or a fatal listener
    /// error. Transient accept errors are logged and retried.
    ///
    /// On return the listener has been released and every connection accepted
    /// by this call has been deregistered and closed.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BridgeError> {
        connection_loop::run(self.state.clone(), listener).await
    }

    /// Delivers `payload` to the connection registered under `id`.
    ///
    /// An unknown or closing identifier is a silent no-op: a connection closing
    /// while a reply for it is in flight is an expected race. A failed write
    /// closes and deregisters that connection only.
    pub async fn dispatch(&self, id: &str, payload: Bytes) -> DispatchOutcome {
        let Some(handle) = self.state.registry.lookup(id) else {
            debug!("Dropping dispatch to unknown connection '{}'.", id);
            metrics::DISPATCH_DROPPED_TOTAL.inc();
            return DispatchOutcome::NotFound;
        };

        match handle.write(&payload, self.state.config.write_timeout()).await {
            Ok(true) => {
                metrics::BYTES_DISPATCHED_TOTAL.inc_by(payload.len() as f64);
                DispatchOutcome::Delivered
            }
            Ok(false) => {
                debug!("Dropping dispatch to closing connection '{}'.", id);
                metrics::DISPATCH_DROPPED_TOTAL.inc();
                DispatchOutcome::NotFound
            }
            Err(e) => {
                warn!("Write to connection {} failed: {}. Closing it.", id, e);
                metrics::DISPATCH_WRITE_ERRORS_TOTAL.inc();
                if handle.begin_close() {
                    // Identifiers are never reused, so this removes exactly `handle`.
                    self.state.registry.remove(id);
                }
                DispatchOutcome::WriteFailed
            }
        }
    }

    /// Requests orderly shutdown: `serve` stops accepting, releases the
    /// listener and closes every open connection.
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Number of connections currently registered.
    pub fn connection_count(&self) -> usize {
        self.state.registry.len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.state.registry.contains(id)
    }
}
