//! Switch topology snapshots and the discovery seam used by AutoLoad.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};
use crate::operation::Operation;
use crate::registry::Port;
use l1_types::{PortId, PortKind};

/// Default model name reported for a chassis.
pub const DEFAULT_CHASSIS_MODEL: &str = "Generic L1 Chassis";

/// Default model name reported for a blade.
pub const DEFAULT_BLADE_MODEL: &str = "Generic L1 Module";

/// The physical layout of one or more chassis, as discovered by AutoLoad.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub chassis: Vec<ChassisInfo>,
}

/// One chassis in a topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChassisInfo {
    /// Resource address, also the chassis component of every [`PortId`].
    pub address: String,
    #[serde(default = "default_chassis_model")]
    pub model_name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub blades: Vec<BladeInfo>,
}

/// One blade (line card) in a chassis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BladeInfo {
    pub number: u16,
    #[serde(default = "default_blade_model")]
    pub model_name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub ports: Vec<PortDescriptor>,
}

/// One front-panel port on a blade.
///
/// A port with `breakout_lanes = n` is exposed as `n` lane ports
/// (`04_1` .. `04_n`) and not as a port of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub number: u16,
    #[serde(default)]
    pub kind: PortKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakout_lanes: Option<u8>,
}

fn default_chassis_model() -> String {
    DEFAULT_CHASSIS_MODEL.to_string()
}

fn default_blade_model() -> String {
    DEFAULT_BLADE_MODEL.to_string()
}

impl PortDescriptor {
    /// Creates a physical, un-laned port descriptor.
    pub fn physical(number: u16) -> Self {
        Self {
            number,
            kind: PortKind::Physical,
            serial_number: None,
            breakout_lanes: None,
        }
    }

    /// Sets the number of breakout lanes.
    pub fn with_breakout(mut self, lanes: u8) -> Self {
        self.breakout_lanes = Some(lanes);
        self
    }

    /// Sets the port kind.
    pub fn with_kind(mut self, kind: PortKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Topology {
    /// Builds a topology with one chassis, one blade and `port_count` ports.
    pub fn single_blade(address: impl Into<String>, port_count: u16) -> Self {
        Self {
            chassis: vec![ChassisInfo {
                address: address.into(),
                model_name: default_chassis_model(),
                serial_number: String::new(),
                blades: vec![BladeInfo {
                    number: 1,
                    model_name: default_blade_model(),
                    serial_number: String::new(),
                    ports: (1..=port_count).map(PortDescriptor::physical).collect(),
                }],
            }],
        }
    }

    /// Returns the part of the topology belonging to one chassis address.
    ///
    /// `address` may carry a scheme or a management port; see
    /// [`chassis_address`].
    pub fn restrict_to(&self, address: &str) -> Option<Topology> {
        let address = chassis_address(address);
        let chassis: Vec<ChassisInfo> = self
            .chassis
            .iter()
            .filter(|c| c.address == address)
            .cloned()
            .collect();
        if chassis.is_empty() {
            None
        } else {
            Some(Topology { chassis })
        }
    }

    /// Expands the snapshot into registry ports, sorted by [`PortId`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if an address component is malformed, a breakout
    /// declares zero lanes, or two descriptors expand to the same port.
    pub fn ports(&self) -> Result<Vec<Port>> {
        let op = Operation::AutoLoad;
        let mut ports: BTreeMap<PortId, Port> = BTreeMap::new();

        for chassis in &self.chassis {
            for blade in &chassis.blades {
                for desc in &blade.ports {
                    let base = PortId::new(chassis.address.as_str(), blade.number, desc.number)
                        .map_err(|e| MappingError::invalid_argument(op, e.to_string()))?;

                    let expanded: Vec<(PortId, String)> = match desc.breakout_lanes {
                        Some(0) => {
                            return Err(MappingError::invalid_argument(
                                op,
                                format!("port {} declares zero breakout lanes", base),
                            ));
                        }
                        Some(lanes) => {
                            let mut out = Vec::with_capacity(lanes as usize);
                            for lane in 1..=lanes {
                                let id = base.clone().with_lane(lane).map_err(|e| {
                                    MappingError::invalid_argument(op, e.to_string())
                                })?;
                                let serial = match &desc.serial_number {
                                    Some(s) => format!("{}.{}", s, lane),
                                    None => default_serial(blade.number, desc.number, lane),
                                };
                                out.push((id, serial));
                            }
                            out
                        }
                        None => {
                            let serial = desc
                                .serial_number
                                .clone()
                                .unwrap_or_else(|| default_serial(blade.number, desc.number, 1));
                            vec![(base, serial)]
                        }
                    };

                    for (id, serial_number) in expanded {
                        if ports.contains_key(&id) {
                            return Err(MappingError::invalid_argument(
                                op,
                                format!("duplicate port {} in topology", id),
                            ));
                        }
                        ports.insert(
                            id.clone(),
                            Port {
                                id,
                                kind: desc.kind,
                                serial_number,
                                attributes: BTreeMap::new(),
                            },
                        );
                    }
                }
            }
        }

        Ok(ports.into_values().collect())
    }
}

/// Reduces a resource address to the chassis address used in [`PortId`]s.
///
/// Drops an `http://`/`https://` scheme, trailing `/` and a numeric `:port`
/// suffix, so `https://192.168.42.240:8443` becomes `192.168.42.240`. A
/// bracketed IPv6 host loses its brackets; a bare IPv6 address is left alone.
pub fn chassis_address(raw: &str) -> &str {
    let mut addr = raw.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = addr.strip_prefix(scheme) {
            addr = rest;
            break;
        }
    }
    let addr = addr.trim_end_matches('/');

    let Some((host, port)) = addr.rsplit_once(':') else {
        return addr;
    };
    if port.parse::<u16>().is_err() {
        return addr;
    }
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return inner;
    }
    if host.contains(':') {
        return addr;
    }
    host
}

fn default_serial(blade: u16, port: u16, lane: u8) -> String {
    format!("{:02}.{}.{}", blade, port, lane)
}

/// Source of topology snapshots for AutoLoad.
///
/// The core ships an in-memory implementation; device-specific discovery
/// is another implementation of this trait.
pub trait TopologySource: Send + Sync {
    /// Discovers the current layout, optionally limited to one chassis.
    fn discover(&self, address: Option<&str>) -> Result<Topology>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "topology source".to_string()
    }
}

/// A fixed, in-memory topology.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    topology: Topology,
}

impl StaticTopology {
    /// Wraps a topology snapshot.
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }
}

impl TopologySource for StaticTopology {
    fn discover(&self, address: Option<&str>) -> Result<Topology> {
        match address {
            Some(addr) => self
                .topology
                .restrict_to(addr)
                .ok_or_else(|| MappingError::discovery(format!("no chassis at address {}", addr))),
            None => Ok(self.topology.clone()),
        }
    }

    fn describe(&self) -> String {
        format!("static topology ({} chassis)", self.topology.chassis.len())
    }
}
