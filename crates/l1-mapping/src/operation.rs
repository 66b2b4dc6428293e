//! Names of the operations the core exposes, used for error context and logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operation against the switch core.
///
/// Display renders the orchestrator's command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    AutoLoad,
    MapBidi,
    MapUni,
    MapTap,
    MapClear,
    MapClearTo,
    Login,
    GetStateId,
    SetStateId,
    GetAttributeValue,
    SetAttributeValue,
    ListPorts,
    LookupPort,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 13] = [
        Operation::AutoLoad,
        Operation::MapBidi,
        Operation::MapUni,
        Operation::MapTap,
        Operation::MapClear,
        Operation::MapClearTo,
        Operation::Login,
        Operation::GetStateId,
        Operation::SetStateId,
        Operation::GetAttributeValue,
        Operation::SetAttributeValue,
        Operation::ListPorts,
        Operation::LookupPort,
    ];

    /// Returns the orchestrator command name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::AutoLoad => "AutoLoad",
            Operation::MapBidi => "MapBidi",
            Operation::MapUni => "MapUni",
            Operation::MapTap => "MapTap",
            Operation::MapClear => "MapClear",
            Operation::MapClearTo => "MapClearTo",
            Operation::Login => "Login",
            Operation::GetStateId => "GetStateId",
            Operation::SetStateId => "SetStateId",
            Operation::GetAttributeValue => "GetAttributeValue",
            Operation::SetAttributeValue => "SetAttributeValue",
            Operation::ListPorts => "ListPorts",
            Operation::LookupPort => "LookupPort",
        }
    }

    /// Looks up an operation by command name (case-insensitive).
    pub fn from_command(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(name))
    }

    /// Returns true if the operation changes switch state.
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::AutoLoad
                | Operation::MapBidi
                | Operation::MapUni
                | Operation::MapTap
                | Operation::MapClear
                | Operation::MapClearTo
                | Operation::SetStateId
                | Operation::SetAttributeValue
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command() {
        assert_eq!(Operation::from_command("MapBidi"), Some(Operation::MapBidi));
        assert_eq!(Operation::from_command("mapclearto"), Some(Operation::MapClearTo));
        assert_eq!(Operation::from_command("Reboot"), None);
    }

    #[test]
    fn test_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_command(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_is_mutation() {
        assert!(Operation::MapUni.is_mutation());
        assert!(!Operation::ListPorts.is_mutation());
        assert!(!Operation::GetStateId.is_mutation());
    }
}
