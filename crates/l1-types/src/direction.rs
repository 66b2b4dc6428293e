//! Mapping direction.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a connection between two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic flows from a source port to a destination port only.
    Uni,
    /// Symmetric connection; each endpoint is both source and destination.
    Bidi,
}

impl Direction {
    /// Returns true for bidirectional connections.
    pub const fn is_bidi(&self) -> bool {
        matches!(self, Direction::Bidi)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Uni => write!(f, "uni"),
            Direction::Bidi => write!(f, "bidi"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uni" | "oneway" => Ok(Direction::Uni),
            "bidi" | "twoway" => Ok(Direction::Bidi),
            _ => Err(ParseError::InvalidDirection(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("uni".parse::<Direction>().unwrap(), Direction::Uni);
        assert_eq!("TwoWay".parse::<Direction>().unwrap(), Direction::Bidi);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Direction::Bidi.to_string(), "bidi");
        assert!(!Direction::Uni.is_bidi());
    }
}
