//! Error types for l1driverd

use l1_mapping::MappingError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Driver daemon errors
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Mapping core error
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Logging setup error
    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<LinesCodecError> for DaemonError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::Io(e) => DaemonError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => {
                DaemonError::Protocol("request line too long".to_string())
            }
        }
    }
}

/// Result type for l1driverd operations
pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use l1_mapping::Operation;

    #[test]
    fn test_error_display() {
        let err = DaemonError::Configuration("port must be > 0".to_string());
        assert_eq!(err.to_string(), "Configuration error: port must be > 0");
    }

    #[test]
    fn test_mapping_error_wraps() {
        let err: DaemonError = MappingError::invalid_argument(Operation::MapUni, "bad").into();
        assert_eq!(
            err.to_string(),
            "Mapping error: MapUni: invalid argument: bad"
        );
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: DaemonError = LinesCodecError::MaxLineLengthExceeded.into();
        assert!(matches!(err, DaemonError::Protocol(_)));
    }
}
