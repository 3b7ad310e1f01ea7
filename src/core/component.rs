// src/core/component.rs

//! The component documentation entry printed by `--json`.

use serde::Serialize;

/// Describes one port of the component.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PortDoc {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// The self-description a flow runtime uses to wire this component.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ComponentDoc {
    pub description: &'static str,
    pub elementary: bool,
    pub inports: Vec<PortDoc>,
    pub outports: Vec<PortDoc>,
}

impl ComponentDoc {
    pub fn tcp_bridge() -> Self {
        Self {
            description: "Generic TCP server. Emits every chunk read from a client as a [connection id, data] substream and writes [connection id, data] substreams back to the matching client.",
            elementary: true,
            inports: vec![
                PortDoc {
                    name: "OPTIONS",
                    kind: "string",
                    description: "Listen address in host:port form",
                    required: true,
                },
                PortDoc {
                    name: "IN",
                    kind: "all",
                    description: "Substreams of [connection id, data] to write to a client",
                    required: true,
                },
            ],
            outports: vec![PortDoc {
                name: "OUT",
                kind: "all",
                description: "Substreams of [connection id, data] read from clients",
                required: true,
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
