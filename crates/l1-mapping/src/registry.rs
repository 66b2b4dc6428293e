//! The port registry: every port the switch is known to have.
//!
//! The registry is replaced as a whole by AutoLoad. A reload is computed as a
//! [`ReconcilePlan`] first and only applied when no mapped port would vanish,
//! so existing connections always refer to registered ports.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionTable;
use crate::error::{MappingError, Result};
use crate::operation::Operation;
use crate::state::PortSnapshot;
use crate::topology::Topology;
use l1_types::{PortId, PortKind};

/// State id reported until the orchestrator sets one.
pub const DEFAULT_STATE_ID: &str = "-1";

/// One registered port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub kind: PortKind,
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Port {
    /// Combines the port with its current mapping state.
    pub fn snapshot(&self, table: &ConnectionTable) -> PortSnapshot {
        PortSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            serial_number: self.serial_number.clone(),
            attributes: self.attributes.clone(),
            state: table.state_of(&self.id),
        }
    }
}

/// Difference between the registry and an incoming topology snapshot.
///
/// Every list is in global port order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Ports only present in the snapshot.
    pub added: Vec<PortId>,
    /// Ports present in both.
    pub retained: Vec<PortId>,
    /// Ports only present in the registry.
    pub removed: Vec<PortId>,
    /// Removed ports that still hold a connection.
    pub conflicts: Vec<PortId>,
}

impl ReconcilePlan {
    /// Returns true if applying the plan would strand a connection.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Returns true if the port set does not change.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Registered ports plus per-session switch metadata.
#[derive(Debug, Clone)]
pub struct PortRegistry {
    ports: BTreeMap<PortId, Port>,
    topology: Option<Topology>,
    state_id: String,
    address: Option<String>,
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            ports: BTreeMap::new(),
            topology: None,
            state_id: DEFAULT_STATE_ID.to_string(),
            address: None,
        }
    }

    /// Returns the number of registered ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns true if nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: &PortId) -> bool {
        self.ports.contains_key(id)
    }

    /// Returns a port by id.
    pub fn get(&self, id: &PortId) -> Option<&Port> {
        self.ports.get(id)
    }

    /// Returns a port by id, or `PortNotFound` attributed to `operation`.
    pub fn lookup(&self, id: &PortId, operation: Operation) -> Result<&Port> {
        self.ports
            .get(id)
            .ok_or_else(|| MappingError::port_not_found(id, operation))
    }

    /// Iterates ports in (chassis, blade, port, lane) order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Returns the last loaded topology.
    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    /// Diffs the registry against `incoming`.
    pub fn plan(&self, incoming: &[Port], table: &ConnectionTable) -> ReconcilePlan {
        let incoming_ids: BTreeSet<&PortId> = incoming.iter().map(|p| &p.id).collect();

        let mut plan = ReconcilePlan::default();
        for id in &incoming_ids {
            if self.ports.contains_key(*id) {
                plan.retained.push((*id).clone());
            } else {
                plan.added.push((*id).clone());
            }
        }
        for id in self.ports.keys() {
            if !incoming_ids.contains(id) {
                plan.removed.push(id.clone());
                if table.is_mapped(id) {
                    plan.conflicts.push(id.clone());
                }
            }
        }
        // Mapped ports the registry never knew about also conflict.
        for id in table.mapped_ports() {
            if !incoming_ids.contains(&id) && !self.ports.contains_key(&id) {
                plan.conflicts.push(id);
            }
        }
        plan.conflicts.sort();
        plan.conflicts.dedup();
        plan
    }

    /// Replaces the registered ports with `incoming`.
    ///
    /// Retained ports keep their attributes. Fails with `TopologyConflict`
    /// and leaves the registry untouched if a removed port is still mapped.
    pub fn load(
        &mut self,
        topology: Topology,
        incoming: Vec<Port>,
        table: &ConnectionTable,
    ) -> Result<ReconcilePlan> {
        let plan = self.plan(&incoming, table);
        if plan.has_conflicts() {
            return Err(MappingError::TopologyConflict {
                ports: plan.conflicts,
            });
        }

        let mut ports = BTreeMap::new();
        for mut port in incoming {
            if let Some(existing) = self.ports.get(&port.id) {
                port.attributes = existing.attributes.clone();
            }
            ports.insert(port.id.clone(), port);
        }
        self.ports = ports;
        self.topology = Some(topology);
        Ok(plan)
    }

    /// Returns the synchronization id.
    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    /// Sets the synchronization id.
    pub fn set_state_id(&mut self, state_id: impl Into<String>) {
        self.state_id = state_id.into();
    }

    /// Returns the chassis address recorded by Login.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Records the chassis address.
    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = Some(address.into());
    }

    /// Reads a port attribute; unset attributes read as an empty string.
    pub fn attribute(&self, id: &PortId, name: &str) -> Result<String> {
        let port = self.lookup(id, Operation::GetAttributeValue)?;
        Ok(port.attributes.get(name).cloned().unwrap_or_default())
    }

    /// Writes a port attribute.
    pub fn set_attribute(
        &mut self,
        id: &PortId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(MappingError::invalid_argument(
                Operation::SetAttributeValue,
                "attribute name must not be empty",
            ));
        }
        let port = self
            .ports
            .get_mut(id)
            .ok_or_else(|| MappingError::port_not_found(id, Operation::SetAttributeValue))?;
        port.attributes.insert(name, value.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TableEdit;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> PortId {
        s.parse().unwrap()
    }

    fn load(
        registry: &mut PortRegistry,
        topology: Topology,
        table: &ConnectionTable,
    ) -> Result<ReconcilePlan> {
        let ports = topology.ports()?;
        registry.load(topology, ports, table)
    }

    #[test]
    fn test_new_registry_defaults() {
        let registry = PortRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.state_id(), DEFAULT_STATE_ID);
        assert_eq!(registry.address(), None);
        assert!(registry.topology().is_none());
    }

    #[test]
    fn test_load_and_lookup() {
        let mut registry = PortRegistry::new();
        let table = ConnectionTable::new(false);
        let plan = load(&mut registry, Topology::single_blade("sw", 3), &table).unwrap();

        assert_eq!(plan.added.len(), 3);
        assert!(plan.retained.is_empty());
        assert!(registry.lookup(&id("sw/1/2"), Operation::LookupPort).is_ok());

        let err = registry
            .lookup(&id("sw/1/9"), Operation::LookupPort)
            .unwrap_err();
        assert_eq!(err, MappingError::port_not_found(&id("sw/1/9"), Operation::LookupPort));
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut registry = PortRegistry::new();
        let table = ConnectionTable::new(false);
        load(&mut registry, Topology::single_blade("sw", 3), &table).unwrap();
        let plan = load(&mut registry, Topology::single_blade("sw", 3), &table).unwrap();

        assert!(plan.is_unchanged());
        assert_eq!(plan.retained.len(), 3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reload_keeps_attributes() {
        let mut registry = PortRegistry::new();
        let table = ConnectionTable::new(false);
        load(&mut registry, Topology::single_blade("sw", 2), &table).unwrap();
        registry
            .set_attribute(&id("sw/1/1"), "Port Speed", "100G")
            .unwrap();

        load(&mut registry, Topology::single_blade("sw", 4), &table).unwrap();
        assert_eq!(registry.attribute(&id("sw/1/1"), "Port Speed").unwrap(), "100G");
        assert_eq!(registry.attribute(&id("sw/1/4"), "Port Speed").unwrap(), "");
    }

    #[test]
    fn test_removing_mapped_port_conflicts() {
        let mut registry = PortRegistry::new();
        let mut table = ConnectionTable::new(false);
        load(&mut registry, Topology::single_blade("sw", 4), &table).unwrap();

        let mut edit = TableEdit::new();
        edit.add_bidi(id("sw/1/3"), id("sw/1/4"));
        table.apply(edit, Operation::MapBidi).unwrap();

        let err = load(&mut registry, Topology::single_blade("sw", 2), &table).unwrap_err();
        assert_eq!(
            err,
            MappingError::TopologyConflict {
                ports: vec![id("sw/1/3"), id("sw/1/4")]
            }
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_removing_unmapped_port_is_allowed() {
        let mut registry = PortRegistry::new();
        let table = ConnectionTable::new(false);
        load(&mut registry, Topology::single_blade("sw", 4), &table).unwrap();
        let plan = load(&mut registry, Topology::single_blade("sw", 2), &table).unwrap();
        assert_eq!(plan.removed, vec![id("sw/1/3"), id("sw/1/4")]);
        assert!(!registry.contains(&id("sw/1/3")));
    }

    #[test]
    fn test_set_attribute_errors() {
        let mut registry = PortRegistry::new();
        let table = ConnectionTable::new(false);
        load(&mut registry, Topology::single_blade("sw", 1), &table).unwrap();

        assert!(registry.set_attribute(&id("sw/1/1"), "", "x").is_err());
        let err = registry.set_attribute(&id("sw/1/7"), "a", "b").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::PortNotFound);
        assert_eq!(err.operation(), Some(Operation::SetAttributeValue));
    }
}
