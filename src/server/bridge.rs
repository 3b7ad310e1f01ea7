// src/server/bridge.rs

//! Translates service output into groups on the output port.

use super::ports::OutputPort;
use super::service::Output;
use crate::core::protocol::encode_event;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Drains the service output into the output port, one complete group per event.
///
/// Runs until `cancel` fires or the output queue closes.
pub async fn forward_output(
    mut output: Output,
    mut port: OutputPort,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = output.recv() => match event {
                Some(event) => event,
                None => {
                    info!("Service output closed.");
                    break;
                }
            },
        };

        debug!(
            "Forwarding {} byte(s) from connection {}",
            event.payload.len(),
            event.id
        );
        if let Err(e) = port.send_group(encode_event(event), &cancel).await {
            if cancel.is_cancelled() {
                break;
            }
            error!("Dropping event that cannot be sent on the output port: {}", e);
        }
    }
    Ok(())
}
