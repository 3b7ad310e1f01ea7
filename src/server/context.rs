// src/server/context.rs

use super::ports::{InputPort, OutputPort};
use super::service::{Output, Service};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Holds all the initialized state required to run the bridge's main loop.
pub struct ServerContext {
    pub service: Service,
    pub output: Output,
    pub listener: TcpListener,
    pub input_port: InputPort,
    pub output_port: OutputPort,
    pub shutdown: CancellationToken,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
