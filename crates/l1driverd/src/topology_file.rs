//! Topology source backed by a TOML or JSON file.
//!
//! The file is re-read on every AutoLoad so edits take effect without a
//! restart.

use l1_mapping::{MappingError, Topology, TopologySource};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads the switch layout from disk.
#[derive(Debug, Clone)]
pub struct FileTopologySource {
    path: PathBuf,
}

impl FileTopologySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the whole file.
    pub fn load(&self) -> Result<Topology, MappingError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            MappingError::discovery(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let topology: Topology = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                MappingError::discovery(format!("invalid JSON in {}: {}", self.path.display(), e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                MappingError::discovery(format!("invalid TOML in {}: {}", self.path.display(), e))
            })?
        };

        debug!(
            "Loaded {} chassis from {}",
            topology.chassis.len(),
            self.path.display()
        );
        Ok(topology)
    }
}

impl TopologySource for FileTopologySource {
    fn discover(&self, address: Option<&str>) -> Result<Topology, MappingError> {
        let topology = self.load()?;
        match address {
            Some(addr) => topology.restrict_to(addr).ok_or_else(|| {
                MappingError::discovery(format!(
                    "no chassis at address {} in {}",
                    addr,
                    self.path.display()
                ))
            }),
            None => Ok(topology),
        }
    }

    fn describe(&self) -> String {
        format!("topology file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1_mapping::ErrorCode;
    use pretty_assertions::assert_eq;

    fn sample_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("conf/topology.toml")
    }

    #[test]
    fn test_sample_topology() {
        let source = FileTopologySource::new(sample_path());
        let topology = source.discover(None).unwrap();
        let ports = topology.ports().unwrap();
        assert_eq!(ports.len(), 9);
        assert_eq!(ports[3].id.to_string(), "192.168.42.240/1/04_1");
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switch.json");
        let topology = Topology::single_blade("10.1.1.1", 6);
        fs::write(&path, serde_json::to_string(&topology).unwrap()).unwrap();

        let source = FileTopologySource::new(&path);
        assert_eq!(source.discover(Some("10.1.1.1")).unwrap(), topology);
        let err = source.discover(Some("10.9.9.9")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscoveryFailed);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileTopologySource::new(dir.path().join("none.toml"));
        assert_eq!(
            missing.discover(None).unwrap_err().code(),
            ErrorCode::DiscoveryFailed
        );

        let path = dir.path().join("bad.toml");
        fs::write(&path, "[[chassis]]\nblades = 3\n").unwrap();
        let err = FileTopologySource::new(&path).load().unwrap_err();
        assert!(err.is_retryable());
    }
}
