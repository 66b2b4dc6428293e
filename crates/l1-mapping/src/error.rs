//! Error types for mapping operations.
//!
//! Every failure carries the operation it came from and, where one exists,
//! the offending port, so the dispatcher can report it without guessing.

use crate::operation::Operation;
use crate::state::MappingState;
use l1_types::PortId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for mapping operations.
pub type Result<T> = std::result::Result<T, MappingError>;

/// Errors that can occur while reading or changing switch state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// A named port is not part of the loaded topology.
    #[error("{operation}: port {port} not found")]
    PortNotFound {
        port: PortId,
        operation: Operation,
    },

    /// A port holds a mapping that conflicts with the request.
    #[error("{operation}: port {port} is busy ({state})")]
    PortBusy {
        port: PortId,
        operation: Operation,
        /// The role the port holds right now.
        state: MappingState,
    },

    /// No uni connection exists between the two ports.
    #[error("{operation}: no mapping from {from} to {to}")]
    MappingNotFound {
        from: PortId,
        to: PortId,
        operation: Operation,
    },

    /// A topology reload would drop ports that still hold connections.
    #[error("AutoLoad: topology no longer contains mapped port(s): {}", join_ports(.ports))]
    TopologyConflict {
        ports: Vec<PortId>,
    },

    /// The switch lock could not be acquired in time.
    #[error("{operation}: timed out after {}ms waiting for the switch lock", millis(.waited))]
    Timeout {
        operation: Operation,
        waited: Duration,
    },

    /// Malformed port id or command shape.
    #[error("{operation}: invalid argument: {message}")]
    InvalidArgument {
        operation: Operation,
        message: String,
    },

    /// The topology source failed to produce a snapshot.
    #[error("topology discovery failed: {message}")]
    Discovery {
        message: String,
    },

    /// Invariant violation inside the core (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

fn millis(waited: &Duration) -> u128 {
    waited.as_millis()
}

fn join_ports(ports: &[PortId]) -> String {
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stable error codes reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PortNotFound,
    PortBusy,
    MappingNotFound,
    TopologyConflict,
    Timeout,
    InvalidArgument,
    DiscoveryFailed,
    Internal,
}

impl MappingError {
    /// Creates a port not found error.
    pub fn port_not_found(port: &PortId, operation: Operation) -> Self {
        Self::PortNotFound {
            port: port.clone(),
            operation,
        }
    }

    /// Creates a port busy error.
    pub fn port_busy(port: &PortId, operation: Operation, state: MappingState) -> Self {
        Self::PortBusy {
            port: port.clone(),
            operation,
            state,
        }
    }

    /// Creates a mapping not found error.
    pub fn mapping_not_found(from: &PortId, to: &PortId, operation: Operation) -> Self {
        Self::MappingNotFound {
            from: from.clone(),
            to: to.clone(),
            operation,
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(operation: Operation, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            message: message.into(),
        }
    }

    /// Creates a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            MappingError::PortNotFound { .. } => ErrorCode::PortNotFound,
            MappingError::PortBusy { .. } => ErrorCode::PortBusy,
            MappingError::MappingNotFound { .. } => ErrorCode::MappingNotFound,
            MappingError::TopologyConflict { .. } => ErrorCode::TopologyConflict,
            MappingError::Timeout { .. } => ErrorCode::Timeout,
            MappingError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            MappingError::Discovery { .. } => ErrorCode::DiscoveryFailed,
            MappingError::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Returns the operation the error came from, if known.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            MappingError::PortNotFound { operation, .. }
            | MappingError::PortBusy { operation, .. }
            | MappingError::MappingNotFound { operation, .. }
            | MappingError::Timeout { operation, .. }
            | MappingError::InvalidArgument { operation, .. } => Some(*operation),
            MappingError::TopologyConflict { .. } => Some(Operation::AutoLoad),
            MappingError::Discovery { .. } | MappingError::Internal { .. } => None,
        }
    }

    /// Returns the offending port, if the error names one.
    ///
    /// For `MappingNotFound` this is the destination; for `TopologyConflict`
    /// the first conflicting port in global order.
    pub fn port(&self) -> Option<&PortId> {
        match self {
            MappingError::PortNotFound { port, .. } | MappingError::PortBusy { port, .. } => {
                Some(port)
            }
            MappingError::MappingNotFound { to, .. } => Some(to),
            MappingError::TopologyConflict { ports } => ports.first(),
            _ => None,
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed when the orchestrator retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MappingError::Timeout { .. } | MappingError::Discovery { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> PortId {
        s.parse().unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = MappingError::port_not_found(&id("sw/1/9"), Operation::MapBidi);
        assert_eq!(err.to_string(), "MapBidi: port sw/1/09 not found");

        let err = MappingError::port_busy(
            &id("sw/1/2"),
            Operation::MapBidi,
            MappingState::BidiWith(id("sw/1/3")),
        );
        assert_eq!(
            err.to_string(),
            "MapBidi: port sw/1/02 is busy (bidi with sw/1/03)"
        );
    }

    #[test]
    fn test_topology_conflict_display() {
        let err = MappingError::TopologyConflict {
            ports: vec![id("sw/1/1"), id("sw/1/2")],
        };
        assert_eq!(
            err.to_string(),
            "AutoLoad: topology no longer contains mapped port(s): sw/1/01, sw/1/02"
        );
        assert_eq!(err.port(), Some(&id("sw/1/1")));
        assert_eq!(err.operation(), Some(Operation::AutoLoad));
    }

    #[test]
    fn test_timeout_display() {
        let err = MappingError::Timeout {
            operation: Operation::MapUni,
            waited: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "MapUni: timed out after 250ms waiting for the switch lock"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            MappingError::mapping_not_found(&id("sw/1/1"), &id("sw/1/2"), Operation::MapClearTo)
                .code(),
            ErrorCode::MappingNotFound
        );
        assert_eq!(
            MappingError::discovery("unreachable").code(),
            ErrorCode::DiscoveryFailed
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::PortBusy).unwrap(),
            "\"PORT_BUSY\""
        );
    }

    #[test]
    fn test_is_retryable() {
        let timeout = MappingError::Timeout {
            operation: Operation::MapBidi,
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(!MappingError::internal("bug").is_retryable());
        assert!(!MappingError::invalid_argument(Operation::MapUni, "x").is_retryable());
    }
}
