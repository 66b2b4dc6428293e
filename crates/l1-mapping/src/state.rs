//! Per-port mapping state as derived from the connection table.

use l1_types::{PortId, PortKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The mapping role a port currently plays.
///
/// A port has exactly one role at a time. `SourceOf` carries more than one
/// destination only when fan-out is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "peers", rename_all = "snake_case")]
pub enum MappingState {
    Unmapped,
    SourceOf(Vec<PortId>),
    DestinationOf(PortId),
    BidiWith(PortId),
}

impl MappingState {
    /// Returns true if the port is not part of any connection.
    pub const fn is_unmapped(&self) -> bool {
        matches!(self, MappingState::Unmapped)
    }

    /// Returns every port this one is connected to.
    pub fn peers(&self) -> Vec<&PortId> {
        match self {
            MappingState::Unmapped => Vec::new(),
            MappingState::SourceOf(dsts) => dsts.iter().collect(),
            MappingState::DestinationOf(p) | MappingState::BidiWith(p) => vec![p],
        }
    }
}

impl fmt::Display for MappingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingState::Unmapped => write!(f, "unmapped"),
            MappingState::SourceOf(dsts) => {
                let list: Vec<String> = dsts.iter().map(ToString::to_string).collect();
                write!(f, "source of {}", list.join(", "))
            }
            MappingState::DestinationOf(src) => write!(f, "destination of {}", src),
            MappingState::BidiWith(peer) => write!(f, "bidi with {}", peer),
        }
    }
}

/// Point-in-time view of one port, as returned to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub id: PortId,
    pub kind: PortKind,
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    pub state: MappingState,
}
