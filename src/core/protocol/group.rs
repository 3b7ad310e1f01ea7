// src/core/protocol/group.rs

//! Translation between bracket-delimited IP groups and the bridge's
//! `(identifier, payload)` records.

use super::ip_frame::IpFrame;
use crate::core::events::{DispatchCommand, OutboundEvent};
use crate::core::metrics;
use bytes::Bytes;
use tracing::{debug, warn};

/// Reassembles `[OpenBracket, Packet(id), Packet(data), CloseBracket]` groups
/// arriving one IP at a time into dispatch commands.
///
/// Malformed groups are logged and dropped; the assembler never fails.
#[derive(Debug, Default)]
pub struct GroupAssembler {
    /// Packets of the group currently open, `None` when outside a group.
    pending: Option<Vec<Bytes>>,
}

impl GroupAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an open bracket has been seen without its close bracket.
    pub fn in_group(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one IP. Returns a command once a well-formed group is closed.
    pub fn push(&mut self, frame: IpFrame) -> Option<DispatchCommand> {
        match frame {
            IpFrame::OpenBracket => {
                if let Some(unterminated) = self.pending.replace(Vec::with_capacity(2)) {
                    warn!(
                        "Dropping unterminated group with {} packet(s): a new group started.",
                        unterminated.len()
                    );
                    metrics::MALFORMED_GROUPS_TOTAL.inc();
                }
                None
            }
            IpFrame::Packet(data) => {
                match self.pending.as_mut() {
                    Some(packets) => packets.push(data),
                    None => {
                        debug!("Dropping packet of {} bytes received outside a group.", data.len());
                    }
                }
                None
            }
            IpFrame::CloseBracket => {
                let Some(packets) = self.pending.take() else {
                    warn!("Dropping close bracket without a matching open bracket.");
                    metrics::MALFORMED_GROUPS_TOTAL.inc();
                    return None;
                };
                let command = into_command(packets);
                if command.is_none() {
                    metrics::MALFORMED_GROUPS_TOTAL.inc();
                }
                command
            }
        }
    }
}

fn into_command(packets: Vec<Bytes>) -> Option<DispatchCommand> {
    let [id, payload]: [Bytes; 2] = match packets.try_into() {
        Ok(pair) => pair,
        Err(packets) => {
            warn!(
                "Dropping malformed group: expected 2 packets, got {}.",
                packets.len()
            );
            return None;
        }
    };

    let id = match String::from_utf8(id.to_vec()) {
        Ok(id) if !id.is_empty() => id,
        Ok(_) => {
            warn!("Dropping malformed group: empty connection identifier.");
            return None;
        }
        Err(_) => {
            warn!("Dropping malformed group: connection identifier is not valid UTF-8.");
            return None;
        }
    };

    Some(DispatchCommand { id, payload })
}

/// Renders an event as the four IPs of one complete group.
pub fn encode_event(event: OutboundEvent) -> [IpFrame; 4] {
    [
        IpFrame::OpenBracket,
        IpFrame::Packet(event.id.to_bytes()),
        IpFrame::Packet(event.payload),
        IpFrame::CloseBracket,
    ]
}
