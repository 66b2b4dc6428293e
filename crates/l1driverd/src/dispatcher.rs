//! Command dispatcher: turns wire requests into engine calls.
//!
//! Each request moves through `Received -> Validated -> Executed` and ends
//! in `Completed` or `Failed`. A request whose command or arguments cannot
//! be validated goes straight from `Received` to `Failed`.

use crate::protocol::{Args, ErrorBody, Request, Response};
use chrono::{DateTime, Utc};
use l1_mapping::{
    FanOutMapping, MappingEngine, MappingError, Operation, TopologySource, UniMapping,
};
use l1_types::PortId;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestPhase {
    Received,
    Validated,
    Executed,
    Completed,
    Failed,
}

impl RequestPhase {
    /// Returns true for `Completed` and `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Completed | RequestPhase::Failed)
    }
}

#[derive(Debug)]
struct RequestTrace {
    id: String,
    command: String,
    phase: RequestPhase,
}

impl RequestTrace {
    fn new(request: &Request) -> Self {
        let trace = Self {
            id: request.id.to_string(),
            command: request.command.clone(),
            phase: RequestPhase::Received,
        };
        debug!(request_id = %trace.id, command = %trace.command, "Request received");
        trace
    }

    fn advance(&mut self, next: RequestPhase) {
        debug!(
            request_id = %self.id,
            command = %self.command,
            from = ?self.phase,
            to = ?next,
            "Request phase"
        );
        self.phase = next;
    }
}

/// Who the orchestrator said it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub address: String,
    pub username: String,
    pub logged_in_at: DateTime<Utc>,
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    AutoLoad { address: Option<String> },
    MapBidi { a: PortId, b: PortId },
    MapUni { source: PortId, destinations: Vec<PortId> },
    MapTap { source: PortId, destinations: Vec<PortId> },
    MapClear { ports: Vec<PortId> },
    MapClearTo { source: PortId, destinations: Vec<PortId> },
    Login { address: String, username: String },
    GetStateId,
    SetStateId { state_id: String },
    GetAttributeValue { port: PortId, name: String },
    SetAttributeValue { port: PortId, name: String, value: String },
    ListPorts,
    LookupPort { port: PortId },
}

const SRC: &[&str] = &["src_port", "source"];
const DST: &[&str] = &["dst_port", "destination"];
const DSTS: &[&str] = &["dst_ports", "dst_port", "destinations"];
const PORT: &[&str] = &["cs_address", "port"];
const ATTR: &[&str] = &["attribute_name", "name"];

impl Command {
    fn parse(operation: Operation, args: Args<'_>) -> Result<Self, MappingError> {
        Ok(match operation {
            Operation::AutoLoad => Command::AutoLoad {
                address: args.opt_string(&["address"])?,
            },
            Operation::MapBidi => Command::MapBidi {
                a: args.port(SRC)?,
                b: args.port(DST)?,
            },
            Operation::MapUni => Command::MapUni {
                source: args.port(SRC)?,
                destinations: args.ports(DSTS)?,
            },
            Operation::MapTap => Command::MapTap {
                source: args.port(SRC)?,
                destinations: args.ports(DSTS)?,
            },
            Operation::MapClear => Command::MapClear {
                ports: args.ports(&["ports", "port"])?,
            },
            Operation::MapClearTo => Command::MapClearTo {
                source: args.port(SRC)?,
                destinations: args.ports(DSTS)?,
            },
            Operation::Login => {
                // The password argument is accepted and dropped here.
                Command::Login {
                    address: args.string(&["address"])?,
                    username: args.opt_string(&["username", "user"])?.unwrap_or_default(),
                }
            }
            Operation::GetStateId => Command::GetStateId,
            Operation::SetStateId => Command::SetStateId {
                state_id: args.string(&["state_id"])?,
            },
            Operation::GetAttributeValue => Command::GetAttributeValue {
                port: args.port(PORT)?,
                name: args.string(ATTR)?,
            },
            Operation::SetAttributeValue => Command::SetAttributeValue {
                port: args.port(PORT)?,
                name: args.string(ATTR)?,
                value: args.string(&["attribute_value", "value"])?,
            },
            Operation::ListPorts => Command::ListPorts,
            Operation::LookupPort => Command::LookupPort {
                port: args.port(PORT)?,
            },
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, MappingError> {
    serde_json::to_value(value)
        .map_err(|e| MappingError::internal(format!("cannot encode result: {}", e)))
}

/// MapUni and MapTap report `{source, destination}` for one distinct
/// destination and `{source, destinations}` otherwise.
fn uni_result(mut mapping: FanOutMapping) -> Result<Value, MappingError> {
    if mapping.destinations.len() == 1 {
        if let Some(destination) = mapping.destinations.pop() {
            return to_value(&UniMapping {
                source: mapping.source,
                destination,
            });
        }
    }
    to_value(&mapping)
}

/// Routes requests to one switch's mapping engine.
pub struct CommandDispatcher {
    engine: Arc<MappingEngine>,
    topology: Option<Arc<dyn TopologySource>>,
    session: Mutex<Option<SessionInfo>>,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<MappingEngine>, topology: Option<Arc<dyn TopologySource>>) -> Self {
        Self {
            engine,
            topology,
            session: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<MappingEngine> {
        &self.engine
    }

    /// Returns the current session, if Login was called.
    pub fn session(&self) -> Option<SessionInfo> {
        self.session.lock().clone()
    }

    /// Decodes and dispatches one request line.
    ///
    /// A line that is not a valid request yields an `INVALID_ARGUMENT`
    /// failure with a null id.
    pub fn dispatch_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                warn!("Malformed request: {}", e);
                Response::failure(
                    Value::Null,
                    ErrorBody::malformed(format!("malformed request: {}", e)),
                )
            }
        }
    }

    /// Validates and executes one request.
    pub fn dispatch(&self, request: Request) -> Response {
        let mut trace = RequestTrace::new(&request);

        let Some(operation) = Operation::from_command(&request.command) else {
            trace.advance(RequestPhase::Failed);
            let message = format!("unknown command {}", request.command);
            return Response::failure(request.id, ErrorBody::malformed(message));
        };
        let command = match Command::parse(operation, Args::new(operation, &request.args)) {
            Ok(command) => command,
            Err(e) => {
                trace.advance(RequestPhase::Failed);
                return Response::failure(request.id, ErrorBody::from(&e));
            }
        };
        trace.advance(RequestPhase::Validated);

        let outcome = self.execute(command);
        trace.advance(RequestPhase::Executed);

        match outcome {
            Ok(result) => {
                trace.advance(RequestPhase::Completed);
                Response::success(request.id, result)
            }
            Err(e) => {
                trace.advance(RequestPhase::Failed);
                warn!(
                    request_id = %trace.id,
                    code = ?e.code(),
                    "{} failed: {}",
                    trace.command,
                    e
                );
                Response::failure(request.id, ErrorBody::from(&e))
            }
        }
    }

    fn execute(&self, command: Command) -> Result<Value, MappingError> {
        let engine = &self.engine;
        match command {
            Command::AutoLoad { address } => {
                let source = self.topology.as_ref().ok_or_else(|| {
                    MappingError::discovery("no topology source configured")
                })?;
                to_value(&engine.autoload(source.as_ref(), address.as_deref())?)
            }
            Command::MapBidi { a, b } => to_value(&engine.map_bidi(&a, &b)?),
            Command::MapUni {
                source,
                destinations,
            } => {
                if let [destination] = destinations.as_slice() {
                    to_value(&engine.map_uni(&source, destination)?)
                } else {
                    uni_result(engine.map_uni_many(&source, &destinations)?)
                }
            }
            Command::MapTap {
                source,
                destinations,
            } => uni_result(engine.map_tap(&source, &destinations)?),
            Command::MapClear { ports } => {
                let removed = match ports.as_slice() {
                    [port] => engine.map_clear(port)?,
                    _ => engine.map_clear_many(&ports)?,
                };
                Ok(json!({ "removed": to_value(&removed)? }))
            }
            Command::MapClearTo {
                source,
                destinations,
            } => {
                let removed = match destinations.as_slice() {
                    [destination] => vec![engine.map_clear_to(&source, destination)?],
                    _ => engine.map_clear_to_many(&source, &destinations)?,
                };
                Ok(json!({ "removed": to_value(&removed)? }))
            }
            Command::Login { address, username } => {
                let address = engine.login(&address)?;
                info!(address = %address, username = %username, "Login");
                let session = SessionInfo {
                    address,
                    username,
                    logged_in_at: Utc::now(),
                };
                let result = to_value(&session)?;
                *self.session.lock() = Some(session);
                Ok(result)
            }
            Command::GetStateId => Ok(json!({ "state_id": engine.state_id()? })),
            Command::SetStateId { state_id } => {
                engine.set_state_id(&state_id)?;
                Ok(json!({ "state_id": state_id }))
            }
            Command::GetAttributeValue { port, name } => {
                let value = engine.attribute(&port, &name)?;
                Ok(json!({
                    "port": port.to_string(),
                    "attribute_name": name,
                    "value": value,
                }))
            }
            Command::SetAttributeValue { port, name, value } => {
                engine.set_attribute(&port, &name, &value)?;
                Ok(json!({
                    "port": port.to_string(),
                    "attribute_name": name,
                    "value": value,
                }))
            }
            Command::ListPorts => Ok(json!({ "ports": to_value(&engine.list()?)? })),
            Command::LookupPort { port } => to_value(&engine.lookup(&port)?),
        }
    }
}
