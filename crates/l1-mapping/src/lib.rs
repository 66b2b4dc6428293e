//! Connection management core for L1 circuit switches.
//!
//! This crate holds the authoritative view of a switch's ports and of the
//! connections between them:
//!
//! - [`PortRegistry`]: known ports, partitioned by chassis and blade
//! - [`ConnectionTable`]: active uni/bidi connections keyed by port
//! - [`MappingEngine`]: MapBidi, MapUni, MapClear, MapClearTo and AutoLoad
//!   as transactional operations over the two
//! - [`TopologySource`]: seam through which AutoLoad discovers the layout
//!
//! # Architecture
//!
//! ```text
//! dispatcher -> MappingEngine -> (RwLock) -> PortRegistry + ConnectionTable
//!                    ^
//!                    +-- TopologySource (AutoLoad only)
//! ```
//!
//! All state for one switch lives behind a single `parking_lot::RwLock`.
//! Mutations hold the write side for the whole operation, so a two-port
//! change is either fully visible or not at all. Lock acquisition is
//! bounded by [`MappingPolicy::lock_timeout`]; expiry yields
//! [`MappingError::Timeout`] and leaves state untouched.
//!
//! # Example
//!
//! ```
//! use l1_mapping::{MappingEngine, MappingPolicy, StaticTopology, Topology};
//!
//! let topology: Topology = Topology::single_blade("sw1", 4);
//! let engine = MappingEngine::new(MappingPolicy::default());
//! engine.autoload(&StaticTopology::new(topology), None).unwrap();
//!
//! let a = "sw1/1/1".parse().unwrap();
//! let b = "sw1/1/2".parse().unwrap();
//! engine.map_bidi(&a, &b).unwrap();
//! assert_eq!(engine.connections().unwrap().len(), 1);
//! ```

mod connection;
mod engine;
mod error;
mod operation;
mod registry;
mod state;
mod topology;

pub use connection::{AppliedEdit, Connection, ConnectionId, ConnectionTable, TableEdit};
pub use engine::{
    AutoloadReport, BidiMapping, EngineStats, FanOutMapping, MappingEngine, MappingPolicy,
    UniMapping,
};
pub use error::{ErrorCode, MappingError, Result};
pub use operation::Operation;
pub use registry::{Port, PortRegistry, ReconcilePlan, DEFAULT_STATE_ID};
pub use state::{MappingState, PortSnapshot};
pub use topology::{
    chassis_address, BladeInfo, ChassisInfo, PortDescriptor, StaticTopology, Topology,
    TopologySource,
};

pub use l1_types::{Direction, ParseError, PortId, PortKind};
