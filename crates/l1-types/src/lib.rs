//! Common types for L1 (physical layer) circuit switch control.
//!
//! This crate provides type-safe representations of the primitives shared
//! by the mapping core and the driver daemon:
//!
//! - [`PortId`]: structured port identity (chassis, blade, port, lane)
//! - [`PortKind`]: physical or virtual port classification
//! - [`Direction`]: unidirectional or bidirectional mapping
//!
//! # Addressing
//!
//! The orchestrator addresses ports as `<chassis>/<blade>/<port>[_<lane>]`,
//! for example `192.168.42.240/1/21` or `192.168.42.240/2/04_3` for lane 3
//! of a breakout port.

mod direction;
mod port;

pub use direction::Direction;
pub use port::{PortId, PortKind};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid port address '{address}': {reason}")]
    InvalidPortId { address: String, reason: String },

    #[error("invalid port kind: {0}")]
    InvalidPortKind(String),

    #[error("invalid mapping direction: {0}")]
    InvalidDirection(String),
}

impl ParseError {
    pub(crate) fn port_id(address: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidPortId {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}
