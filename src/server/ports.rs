// src/server/ports.rs

//! Message ports: TCP endpoints exchanging framed information packets with
//! the surrounding flow runtime.

use super::connection_loop::is_transient_accept_error;
use crate::config::PortsConfig;
use crate::core::BridgeError;
use crate::core::protocol::{IpFrame, IpFrameCodec};
use futures::{SinkExt, Stream, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Frames buffered between the port's peers and its reader.
const PORT_QUEUE_CAPACITY: usize = 1024;

/// Turns `tcp://host:port` (or bare `host:port`) into a socket address string.
/// A `*` host means every interface.
pub fn parse_endpoint(endpoint: &str) -> Result<String, BridgeError> {
    let trimmed = endpoint.trim();
    let address = match trimmed.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(BridgeError::InvalidEndpoint(endpoint.to_string())),
        None => trimmed,
    };

    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(BridgeError::InvalidEndpoint(endpoint.to_string()));
    };
    if port.parse::<u16>().is_err() {
        return Err(BridgeError::InvalidEndpoint(endpoint.to_string()));
    }
    let host = match host {
        "*" => "0.0.0.0",
        "" => return Err(BridgeError::InvalidEndpoint(endpoint.to_string())),
        other => other,
    };
    Ok(format!("{host}:{port}"))
}

/// An input port. Binds its endpoint, accepts any number of upstream peers
/// and merges their packets into one queue.
///
/// Dropping the port stops its listener and disconnects all peers.
pub struct InputPort {
    name: String,
    rx: mpsc::Receiver<IpFrame>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl InputPort {
    pub async fn bind(
        name: &str,
        endpoint: &str,
        max_frame_size: usize,
    ) -> Result<Self, BridgeError> {
        let address = parse_endpoint(endpoint)?;
        let listener = TcpListener::bind(address.as_str()).await?;
        let local_addr = listener.local_addr()?;
        info!("Input port '{}' bound to {}", name, local_addr);

        Ok(Self::from_incoming(
            name,
            TcpListenerStream::new(listener),
            local_addr,
            max_frame_size,
        ))
    }

    /// Builds a port over any stream of accepted peer sockets.
    ///
    /// The port closes when `incoming` ends or yields an accept error that is
    /// not transient.
    pub fn from_incoming<S>(
        name: &str,
        incoming: S,
        local_addr: SocketAddr,
        max_frame_size: usize,
    ) -> Self
    where
        S: Stream<Item = io::Result<TcpStream>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(PORT_QUEUE_CAPACITY);
        let accept_task = tokio::spawn(accept_peers(
            name.to_string(),
            incoming,
            tx,
            max_frame_size,
        ));
        Self {
            name: name.to_string(),
            rx,
            local_addr,
            accept_task,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next packet from any peer.
    /// Returns `None` once the port's listener has failed and every peer is gone.
    pub async fn recv(&mut self) -> Option<IpFrame> {
        self.rx.recv().await
    }

    /// Releases the endpoint.
    pub fn close(self) {
        debug!("Closing input port '{}'.", self.name);
    }
}

impl Stream for InputPort {
    type Item = IpFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for InputPort {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_peers<S>(
    name: String,
    mut incoming: S,
    tx: mpsc::Sender<IpFrame>,
    max_frame_size: usize,
) where
    S: Stream<Item = io::Result<TcpStream>> + Unpin,
{
    // Returning drops the set, which aborts every peer reader and with them
    // the last senders, so the port's receiver sees the end of the queue.
    let mut peers = JoinSet::new();
    loop {
        tokio::select! {
            next = incoming.next() => match next {
                Some(Ok(socket)) => {
                    let addr = socket
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown peer".to_string());
                    debug!("Port '{}' accepted peer {}", name, addr);
                    let tx = tx.clone();
                    let name = name.clone();
                    peers.spawn(async move {
                        let mut frames = FramedRead::new(socket, IpFrameCodec::new(max_frame_size));
                        while let Some(res) = frames.next().await {
                            match res {
                                Ok(frame) => {
                                    if tx.send(frame).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!("Port '{}' dropping peer {}: {}", name, addr, e);
                                    return;
                                }
                            }
                        }
                        debug!("Port '{}' peer {} disconnected.", name, addr);
                    });
                }
                Some(Err(e)) if is_transient_accept_error(&e) => {
                    warn!("Port '{}' failed to accept a peer: {}. Retrying.", name, e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Some(Err(e)) => {
                    error!("Port '{}' listener failed: {}. Closing the port.", name, e);
                    return;
                }
                None => {
                    warn!("Port '{}' listener stopped. Closing the port.", name);
                    return;
                }
            },
            Some(_) = peers.join_next() => {}
        }
    }
}

/// The output port. Connects to its endpoint on first use and writes each
/// group as one uninterrupted run of frames.
pub struct OutputPort {
    address: String,
    max_frame_size: usize,
    retry: Duration,
    sink: Option<FramedWrite<TcpStream, IpFrameCodec>>,
}

impl OutputPort {
    pub fn new(endpoint: &str, config: &PortsConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            address: parse_endpoint(endpoint)?,
            max_frame_size: config.max_frame_size,
            retry: config.connect_retry(),
            sink: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Sends all `frames` back to back. On a broken connection the port
    /// reconnects and resends the whole group. Gives up only when `cancel` fires.
    pub async fn send_group(
        &mut self,
        frames: [IpFrame; 4],
        cancel: &CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            if self.sink.is_none() {
                self.connect(cancel).await?;
            }
            let Some(sink) = self.sink.as_mut() else {
                continue;
            };

            let mut sent = Ok(());
            for frame in frames.iter().cloned() {
                sent = sink.feed(frame).await;
                if sent.is_err() {
                    break;
                }
            }
            if sent.is_ok() {
                sent = sink.flush().await;
            }

            match sent {
                Ok(()) => return Ok(()),
                Err(e @ BridgeError::FrameTooLarge { .. }) => {
                    // Resending will not help; drop the half-written group with the connection.
                    self.sink = None;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Output port write to {} failed: {}. Reconnecting.", self.address, e);
                    self.sink = None;
                }
            }
        }
    }

    async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(BridgeError::ChannelClosed("output port shut down".to_string()));
                }
                res = TcpStream::connect(self.address.as_str()) => res,
            };
            match attempt {
                Ok(stream) => {
                    info!("Output port connected to {}", self.address);
                    self.sink = Some(FramedWrite::new(
                        stream,
                        IpFrameCodec::new(self.max_frame_size),
                    ));
                    return Ok(());
                }
                Err(e) => {
                    debug!("Output port connect to {} failed: {}", self.address, e);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.retry) => {}
                    }
                }
            }
        }
    }
}
