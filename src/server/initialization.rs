// src/server/initialization.rs

//! Brings the bridge up: opens the ports, waits for the listen address and
//! binds the client-facing listener.

use super::Endpoints;
use super::bind::{await_bind_address, bind_listener};
use super::context::ServerContext;
use super::ports::{InputPort, OutputPort};
use super::service::Service;
use crate::config::Config;
use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Initializes all bridge components before starting the main loop.
pub async fn setup(
    endpoints: &Endpoints,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<ServerContext> {
    log_startup_info(config);
    let max_frame_size = config.ports.max_frame_size;

    let mut options_port = InputPort::bind("options", &endpoints.options, max_frame_size)
        .await
        .with_context(|| format!("Failed to open options port '{}'", endpoints.options))?;
    let input_port = InputPort::bind("in", &endpoints.input, max_frame_size)
        .await
        .with_context(|| format!("Failed to open input port '{}'", endpoints.input))?;
    let output_port = OutputPort::new(&endpoints.output, &config.ports)
        .with_context(|| format!("Invalid output port '{}'", endpoints.output))?;

    info!("Waiting for configuration...");
    let bind_addr = await_bind_address(&mut options_port).await?;
    options_port.close();

    let listener = bind_listener(bind_addr)
        .await
        .with_context(|| format!("Failed to listen on {bind_addr}"))?;
    info!("Listening on {}", listener.local_addr()?);

    let (service, output) = Service::new(config.bridge.clone());

    Ok(ServerContext {
        service,
        output,
        listener,
        input_port,
        output_port,
        shutdown,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Bridge configured with read_chunk_size={} output_capacity={} max_connections={}",
        config.bridge.read_chunk_size, config.bridge.output_capacity, config.bridge.max_connections
    );
    match config.bridge.write_timeout() {
        Some(limit) => info!("Dispatch writes time out after {:?}.", limit),
        None => info!("Dispatch writes have no timeout."),
    }
}
