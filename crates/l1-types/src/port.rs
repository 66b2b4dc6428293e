//! Port identity and classification for L1 switch ports.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structured identity of a switch port.
///
/// Field order defines the total order used for listing and for lock
/// acquisition: chassis, then blade, then port number, then lane. A port
/// without a lane sorts before any of its lanes.
///
/// # Examples
///
/// ```
/// use l1_types::PortId;
///
/// let port: PortId = "192.168.42.240/1/21".parse().unwrap();
/// assert_eq!(port.blade(), 1);
/// assert_eq!(port.port(), 21);
/// assert_eq!(port.lane(), None);
///
/// let lane: PortId = "192.168.42.240/2/04_3".parse().unwrap();
/// assert_eq!(lane.lane(), Some(3));
/// assert_eq!(lane.to_string(), "192.168.42.240/2/04_3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId {
    chassis: String,
    blade: u16,
    port: u16,
    lane: Option<u8>,
}

impl PortId {
    /// Creates a port id for an un-laned port.
    ///
    /// # Errors
    ///
    /// Returns an error if the chassis is empty or contains `/`, or if the
    /// blade or port number is zero.
    pub fn new(chassis: impl Into<String>, blade: u16, port: u16) -> Result<Self, ParseError> {
        let chassis = chassis.into();
        if chassis.is_empty() {
            return Err(ParseError::port_id(&chassis, "empty chassis address"));
        }
        if chassis.contains('/') {
            return Err(ParseError::port_id(&chassis, "chassis address contains '/'"));
        }
        if blade == 0 {
            return Err(ParseError::port_id(&chassis, "blade numbers start at 1"));
        }
        if port == 0 {
            return Err(ParseError::port_id(&chassis, "port numbers start at 1"));
        }
        Ok(Self {
            chassis,
            blade,
            port,
            lane: None,
        })
    }

    /// Returns the same port narrowed to a breakout lane.
    pub fn with_lane(mut self, lane: u8) -> Result<Self, ParseError> {
        if lane == 0 {
            return Err(ParseError::port_id(&self.to_string(), "lane numbers start at 1"));
        }
        self.lane = Some(lane);
        Ok(self)
    }

    /// Returns the chassis address.
    pub fn chassis(&self) -> &str {
        &self.chassis
    }

    /// Returns the blade (line card) number.
    pub const fn blade(&self) -> u16 {
        self.blade
    }

    /// Returns the port number on the blade.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the breakout lane, if any.
    pub const fn lane(&self) -> Option<u8> {
        self.lane
    }

    /// Returns the port name relative to its blade (`21`, `04_3`).
    pub fn local_name(&self) -> String {
        match self.lane {
            Some(lane) => format!("{:02}_{}", self.port, lane),
            None => format!("{:02}", self.port),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.chassis, self.blade, self.local_name())
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let [chassis, blade, port] = parts.as_slice() else {
            return Err(ParseError::port_id(s, "expected <chassis>/<blade>/<port>"));
        };

        let blade: u16 = blade
            .parse()
            .map_err(|_| ParseError::port_id(s, format!("invalid blade '{}'", blade)))?;

        let (port_str, lane_str) = match port.split_once('_') {
            Some((p, l)) => (p, Some(l)),
            None => (*port, None),
        };
        let port_num: u16 = port_str
            .parse()
            .map_err(|_| ParseError::port_id(s, format!("invalid port '{}'", port_str)))?;

        let id = PortId::new(*chassis, blade, port_num).map_err(|e| match e {
            ParseError::InvalidPortId { reason, .. } => ParseError::port_id(s, reason),
            other => other,
        })?;

        match lane_str {
            Some(l) => {
                let lane: u8 = l
                    .parse()
                    .map_err(|_| ParseError::port_id(s, format!("invalid lane '{}'", l)))?;
                id.with_lane(lane)
            }
            None => Ok(id),
        }
    }
}

impl TryFrom<String> for PortId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortId> for String {
    fn from(id: PortId) -> String {
        id.to_string()
    }
}

/// Kind of switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Front-panel port backed by hardware (default).
    #[default]
    Physical,
    /// Logical port (e.g. a virtual cross-connect endpoint).
    Virtual,
}

impl PortKind {
    /// Returns true if this is a physical port.
    pub const fn is_physical(&self) -> bool {
        matches!(self, PortKind::Physical)
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Physical => write!(f, "physical"),
            PortKind::Virtual => write!(f, "virtual"),
        }
    }
}

impl FromStr for PortKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "physical" | "phy" => Ok(PortKind::Physical),
            "virtual" | "virt" => Ok(PortKind::Virtual),
            _ => Err(ParseError::InvalidPortKind(s.to_string())),
        }
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
    fn test_parse_plain_port() {
        let p = id("192.168.42.240/1/21");
        assert_eq!(p.chassis(), "192.168.42.240");
        assert_eq!(p.blade(), 1);
        assert_eq!(p.port(), 21);
        assert_eq!(p.lane(), None);
    }

    #[test]
    fn test_parse_lane_port() {
        let p = id("10.0.0.1/2/4_3");
        assert_eq!(p.port(), 4);
        assert_eq!(p.lane(), Some(3));
        assert_eq!(p.to_string(), "10.0.0.1/2/04_3");
    }

    #[test]
    fn test_display_pads_port() {
        assert_eq!(id("sw1/1/3").to_string(), "sw1/1/03");
        assert_eq!(id("sw1/1/03"), id("sw1/1/3"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<PortId>().is_err());
        assert!("sw1/1".parse::<PortId>().is_err());
        assert!("sw1/1/2/3".parse::<PortId>().is_err());
        assert!("sw1/x/2".parse::<PortId>().is_err());
        assert!("sw1/1/0".parse::<PortId>().is_err());
        assert!("sw1/0/1".parse::<PortId>().is_err());
        assert!("sw1/1/2_0".parse::<PortId>().is_err());
        assert!("sw1/1/2_".parse::<PortId>().is_err());
        assert!("/1/2".parse::<PortId>().is_err());
    }

    #[test]
    fn test_total_order() {
        let mut ports = vec![
            id("sw1/2/1"),
            id("sw1/1/10"),
            id("sw1/1/2_1"),
            id("sw1/1/2"),
            id("sw0/9/9"),
        ];
        ports.sort();
        let rendered: Vec<String> = ports.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["sw0/9/09", "sw1/1/02", "sw1/1/02_1", "sw1/1/10", "sw1/2/01"]
        );
    }

    #[test]
    fn test_serde_as_string() {
        let p = id("sw1/1/7_2");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"sw1/1/07_2\"");
        let back: PortId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<PortId>("\"bad\"").is_err());
    }

    #[test]
    fn test_port_kind() {
        assert_eq!("physical".parse::<PortKind>().unwrap(), PortKind::Physical);
        assert_eq!("VIRTUAL".parse::<PortKind>().unwrap(), PortKind::Virtual);
        assert!("copper".parse::<PortKind>().is_err());
        assert!(PortKind::default().is_physical());
        assert_eq!(PortKind::Virtual.to_string(), "virtual");
    }
}
