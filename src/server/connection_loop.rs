// src/server/connection_loop.rs

//! Contains the accept loop that turns incoming sockets into registered
//! connections with their own handler tasks.

use super::service::ServiceState;
use crate::connection::{ConnectionHandle, ConnectionHandler};
use crate::core::metrics;
use crate::core::{BridgeError, ConnectionId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The accept loop. Runs until shutdown is requested or the listener breaks.
pub(crate) async fn run(state: Arc<ServiceState>, listener: TcpListener) -> Result<(), BridgeError> {
    let mut client_tasks = JoinSet::new();
    match listener.local_addr() {
        Ok(addr) => info!("Accepting client connections on {}", addr),
        Err(e) => warn!("Accepting client connections on an unknown address: {}", e),
    }

    let result = loop {
        tokio::select! {
            biased;

            _ = state.shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections.");
                break Ok(());
            }

            res = listener.accept() => match res {
                Ok((socket, addr)) => accept_connection(&state, &mut client_tasks, socket, addr),
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("Transient error while accepting a connection: {}. Retrying.", e);
                    tokio::time::sleep(state.config.accept_backoff()).await;
                }
                Err(e) => {
                    error!("CRITICAL: Listener failed: {}. No further connections can be accepted.", e);
                    break Err(BridgeError::Listener(e.to_string()));
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection handler panicked: {e:?}");
                }
            },
        }
    };

    drop(listener);
    // Handler tokens are children of the shutdown token.
    state.shutdown.cancel();

    let open = client_tasks.len();
    if open > 0 {
        info!("Closing {} open connection(s).", open);
    }
    if tokio::time::timeout(state.config.shutdown_grace(), async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connection handlers, aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");
    result
}

fn accept_connection(
    state: &Arc<ServiceState>,
    client_tasks: &mut JoinSet<()>,
    socket: TcpStream,
    addr: SocketAddr,
) {
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

    let Ok(permit) = state.connection_permits.clone().try_acquire_owned() else {
        warn!(
            "Connection limit of {} reached, dropping connection from {}",
            state.config.max_connections, addr
        );
        metrics::CONNECTIONS_REJECTED_TOTAL.inc();
        return;
    };

    if state.config.tcp_nodelay
        && let Err(e) = socket.set_nodelay(true)
    {
        debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
    }

    let seq = state.next_seq.fetch_add(1, Ordering::Relaxed);
    let id = ConnectionId::for_peer(addr, seq);
    let (reader, writer) = socket.into_split();
    let handle = Arc::new(ConnectionHandle::new(
        id.clone(),
        addr,
        writer,
        state.shutdown.child_token(),
    ));

    if let Err(e) = state.registry.insert(id.clone(), handle.clone()) {
        warn!("Refusing connection from {}: {}", addr, e);
        return;
    }
    metrics::CONNECTED_CLIENTS.inc();
    info!("Accepted new connection {} from {}", id, addr);

    let handler = ConnectionHandler::new(
        reader,
        handle,
        state.registry.clone(),
        state.events_tx.clone(),
        state.config.read_chunk_size,
    );
    client_tasks.spawn(async move {
        let _permit = permit;
        handler.run().await;
    });
}

/// Accept errors that describe a single failed connection or a temporary
/// resource shortage rather than a broken listener.
pub(crate) fn is_transient_accept_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    if matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) {
        return true;
    }
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::EPROTO | libc::EPERM)
    )
}
