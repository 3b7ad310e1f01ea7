// src/server/mod.rs

//! The multiplexing service and the process runtime that wires it to the
//! message ports.

use crate::config::Config;
use crate::core::protocol::GroupAssembler;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod bind;
pub mod bridge;
mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
pub mod ports;
mod service;

pub use service::{DispatchOutcome, Output, Service};

/// The three message port endpoints the bridge is wired to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub options: String,
    pub input: String,
    pub output: String,
}

/// Runs the bridge until SIGINT/SIGTERM, the input port closing, or a fatal
/// service error.
pub async fn run(endpoints: Endpoints, config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(watch_signals(shutdown.clone()));
    let result = run_until(endpoints, config, shutdown).await;
    signals.abort();
    result
}

/// Runs the bridge until `shutdown` is cancelled or it stops on its own.
pub async fn run_until(endpoints: Endpoints, config: Config, shutdown: CancellationToken) -> Result<()> {
    // 1. Open ports, wait for the listen address, bind the listener.
    let ctx = tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown requested before the bridge was configured.");
            return Ok(());
        }
        ctx = initialization::setup(&endpoints, &config, shutdown.clone()) => ctx?,
    };

    let context::ServerContext {
        service,
        output,
        listener,
        mut input_port,
        output_port,
        shutdown,
        mut background_tasks,
    } = ctx;

    // 2. Spawn the accept loop, the output translator and the metrics endpoint.
    let serve_service = service.clone();
    background_tasks.spawn(async move {
        serve_service.serve(listener).await?;
        Ok::<(), anyhow::Error>(())
    });
    background_tasks.spawn(bridge::forward_output(
        output,
        output_port,
        shutdown.clone(),
    ));
    if config.metrics.enabled {
        background_tasks.spawn(metrics_server::run_metrics_server(
            config.metrics.port,
            shutdown.clone(),
        ));
    }

    // 3. Dispatch inbound groups until something asks us to stop.
    info!("Started...");
    let mut assembler = GroupAssembler::new();
    let outcome = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break Ok(()),

            Some(res) = background_tasks.join_next() => match res {
                Ok(Ok(())) => {
                    if !shutdown.is_cancelled() {
                        warn!("A background task finished unexpectedly without an error.");
                    }
                }
                Ok(Err(e)) => {
                    error!("CRITICAL: Background task failed: {}. Shutting down.", e);
                    break Err(e);
                }
                Err(e) => {
                    error!("CRITICAL: Background task panicked: {e:?}. Shutting down.");
                    break Err(anyhow!("background task panicked: {e}"));
                }
            },

            frame = input_port.recv() => match frame {
                Some(frame) => {
                    if let Some(command) = assembler.push(frame) {
                        // A peer that stops reading must not keep shutdown waiting.
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break Ok(()),
                            _ = service.dispatch(&command.id, command.payload) => {}
                        }
                    }
                }
                None => {
                    warn!("Input port closed, shutting down.");
                    break Ok(());
                }
            },
        }
    };

    // 4. Orderly shutdown: release the listener, close every connection, close ports.
    info!("Shutting down. Sending signal to all tasks.");
    service.shutdown();
    shutdown.cancel();

    let grace = config.bridge.shutdown_grace() + Duration::from_secs(1);
    if tokio::time::timeout(grace, async {
        while let Some(res) = background_tasks.join_next().await {
            if let Ok(Err(e)) = res {
                warn!("Background task ended with error during shutdown: {}", e);
            }
        }
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        background_tasks.shutdown().await;
    }
    input_port.close();
    info!("Bridge shutdown complete.");
    outcome
}

async fn watch_signals(shutdown: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }
    shutdown.cancel();
    Ok(())
}
