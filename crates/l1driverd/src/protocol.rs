//! Wire format: one JSON object per line in each direction.
//!
//! ```text
//! -> {"id": 7, "command": "MapBidi", "args": {"src_port": "sw/1/1", "dst_port": "sw/1/2"}}
//! <- {"id": 7, "success": true, "result": {...}}
//! <- {"id": 7, "success": false, "error": {"code": "PORT_BUSY", "message": "...", ...}}
//! ```

use l1_mapping::{ErrorCode, MappingError, Operation};
use l1_types::PortId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Opaque correlation id echoed in the response.
    #[serde(default)]
    pub id: Value,
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Request {
    /// Builds a request, mostly for clients and tests.
    pub fn new(id: impl Into<Value>, command: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            command: command.into(),
            args,
        }
    }
}

/// Failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl ErrorBody {
    /// A request that could not be decoded at all.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument,
            message: message.into(),
            operation: None,
            port: None,
        }
    }
}

impl From<&MappingError> for ErrorBody {
    fn from(err: &MappingError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            operation: err.operation().map(|op| op.as_str().to_string()),
            port: err.port().map(ToString::to_string),
        }
    }
}

/// A response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: ErrorBody) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the error code of a failed response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Typed access to a request's `args` object.
///
/// Every lookup accepts a list of key aliases; the first present key wins.
/// Failures are `InvalidArgument` attributed to the request's operation.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    operation: Operation,
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(operation: Operation, map: &'a Map<String, Value>) -> Self {
        Self { operation, map }
    }

    fn find<'k>(&self, keys: &[&'k str]) -> Option<(&'k str, &'a Value)> {
        let map: &'a Map<String, Value> = self.map;
        keys.iter().find_map(|key| {
            map.get(*key)
                .filter(|v| !v.is_null())
                .map(|v| (*key, v))
        })
    }

    fn invalid(&self, message: String) -> MappingError {
        MappingError::invalid_argument(self.operation, message)
    }

    /// An optional string argument.
    pub fn opt_string(&self, keys: &[&str]) -> Result<Option<String>, MappingError> {
        match self.find(keys) {
            None => Ok(None),
            Some((_, Value::String(s))) => Ok(Some(s.clone())),
            Some((_, Value::Number(n))) => Ok(Some(n.to_string())),
            Some((key, _)) => Err(self.invalid(format!("argument {} must be a string", key))),
        }
    }

    /// A required string argument.
    pub fn string(&self, keys: &[&str]) -> Result<String, MappingError> {
        self.opt_string(keys)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", keys[0])))
    }

    /// A required port argument.
    pub fn port(&self, keys: &[&str]) -> Result<PortId, MappingError> {
        let raw = self.string(keys)?;
        self.parse_port(&raw)
    }

    /// A required port list; a single string counts as a list of one.
    pub fn ports(&self, keys: &[&str]) -> Result<Vec<PortId>, MappingError> {
        let (key, value) = self
            .find(keys)
            .ok_or_else(|| self.invalid(format!("missing argument {}", keys[0])))?;
        let raw = match OneOrMany::deserialize(value) {
            Ok(OneOrMany::One(s)) => vec![s],
            Ok(OneOrMany::Many(list)) => list,
            Err(_) => {
                return Err(self.invalid(format!(
                    "argument {} must be a port or a list of ports",
                    key
                )))
            }
        };
        if raw.is_empty() {
            return Err(self.invalid(format!("argument {} must not be empty", key)));
        }
        raw.iter().map(|s| self.parse_port(s)).collect()
    }

    fn parse_port(&self, raw: &str) -> Result<PortId, MappingError> {
        raw.trim()
            .parse()
            .map_err(|e: l1_types::ParseError| self.invalid(e.to_string()))
    }
}
