//! L1 switch driver daemon.
//!
//! Accepts orchestrator commands (AutoLoad, MapBidi, MapUni, MapTap,
//! MapClear, MapClearTo and the session/attribute commands) as
//! newline-delimited JSON over TCP and executes them against a
//! [`l1_mapping::MappingEngine`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod topology_file;

pub use config::{ConfigOverrides, DaemonConfig, DEFAULT_CONFIG_PATH};
pub use dispatcher::{CommandDispatcher, RequestPhase, SessionInfo};
pub use error::{DaemonError, Result};
pub use logging::init_logging;
pub use protocol::{ErrorBody, Request, Response};
pub use server::{spawn_server, Server};
pub use topology_file::FileTopologySource;
