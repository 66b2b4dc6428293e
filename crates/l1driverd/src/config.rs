//! Configuration file support for l1driverd
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: /etc/l1driverd/l1driverd.toml
//!
//! The launcher hands in the listen port and log directory on the command
//! line; those values override whatever the file says.

use crate::error::{DaemonError, Result};
use l1_mapping::MappingPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/l1driverd/l1driverd.toml";

/// Command server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// TCP port the orchestrator connects to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Longest accepted request line in bytes
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for l1driverd.log; stderr when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Default level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Mapping policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Allow one uni source to feed several destinations
    #[serde(default)]
    pub fan_out: bool,

    /// Let MapBidi replace existing bidi pairs
    #[serde(default)]
    pub bidi_remap: bool,

    /// Switch lock timeout in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Topology source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// TOML or JSON topology file used by AutoLoad
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Complete l1driverd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub topology: TopologyConfig,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub topology: Option<PathBuf>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_max_line_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_port(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: default_log_level(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            fan_out: false,
            bidi_remap: false,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DaemonError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "l1driverd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(DaemonError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DaemonError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(dir) = overrides.log_dir {
            self.logging.log_dir = Some(dir);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(file) = overrides.topology {
            self.topology.file = Some(file);
        }
        self
    }

    /// Address the command server binds to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.server.listen_address.parse().map_err(|e| {
            DaemonError::Configuration(format!(
                "invalid listen_address {}: {}",
                self.server.listen_address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Get lock timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.mapping.lock_timeout_ms)
    }

    /// Mapping policy for the engine
    pub fn mapping_policy(&self) -> MappingPolicy {
        MappingPolicy {
            fan_out: self.mapping.fan_out,
            bidi_remap: self.mapping.bidi_remap,
            lock_timeout: self.lock_timeout(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(DaemonError::Configuration(
                "port must be > 0".to_string(),
            ));
        }

        if self.server.max_line_bytes == 0 {
            return Err(DaemonError::Configuration(
                "max_line_bytes must be > 0".to_string(),
            ));
        }

        if self.mapping.lock_timeout_ms == 0 {
            return Err(DaemonError::Configuration(
                "lock_timeout_ms must be > 0".to_string(),
            ));
        }

        self.socket_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_address, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.log_dir, None);
        assert!(!config.mapping.fan_out);
        assert!(!config.mapping.bidi_remap);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mapping_policy_from_config() {
        let mut config = DaemonConfig::default();
        config.mapping.fan_out = true;
        config.mapping.lock_timeout_ms = 250;
        let policy = config.mapping_policy();
        assert!(policy.fan_out);
        assert!(!policy.bidi_remap);
        assert_eq!(policy.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.mapping.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.server.listen_address = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ipv6_socket_addr() {
        let mut config = DaemonConfig::default();
        config.server.listen_address = "::1".to_string();
        assert_eq!(config.socket_addr().unwrap().to_string(), "[::1]:4000");
    }

    #[test]
    fn test_overrides_win() {
        let config = DaemonConfig::default().with_overrides(ConfigOverrides {
            port: Some(4100),
            log_dir: Some(PathBuf::from("/var/log/l1")),
            log_level: None,
            topology: Some(PathBuf::from("/etc/l1driverd/topology.toml")),
        });
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.logging.log_dir, Some(PathBuf::from("/var/log/l1")));
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.topology.file,
            Some(PathBuf::from("/etc/l1driverd/topology.toml"))
        );
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
port = 4010

[mapping]
fan_out = true
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 4010);
        assert!(config.mapping.fan_out);
        // Unspecified values should use defaults
        assert_eq!(config.server.listen_address, "0.0.0.0");
        assert_eq!(config.mapping.lock_timeout_ms, 5000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l1driverd.toml");

        let mut config = DaemonConfig::default();
        config.server.port = 4242;
        config.logging.log_dir = Some(dir.path().to_path_buf());
        config.save(&path).unwrap();

        let loaded = DaemonConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[server\nport = ").unwrap();
        let err = DaemonConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, DaemonError::Configuration(_)));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = DaemonConfig::load_or_default("/nonexistent/l1driverd.toml").unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: DaemonConfig =
            toml::from_str(include_str!("../conf/l1driverd.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 4000);
    }
}
