//! The mapping engine: transactional operations over registry and table.
//!
//! Each operation takes the switch lock once, validates every port it
//! touches in global [`PortId`] order, builds one [`TableEdit`] and applies
//! it. Nothing is written until validation has passed, so a failed call
//! (including a lock timeout) leaves the switch exactly as it found it.

use std::collections::BTreeSet;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::connection::{AppliedEdit, Connection, ConnectionTable, TableEdit};
use crate::error::{MappingError, Result};
use crate::operation::Operation;
use crate::registry::{PortRegistry, ReconcilePlan};
use crate::state::{MappingState, PortSnapshot};
use crate::topology::{chassis_address, Topology, TopologySource};
use l1_types::PortId;

/// Default bound on waiting for the switch lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Behaviour switches the orchestrator contract leaves open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingPolicy {
    /// Allow one uni source to feed several destinations.
    pub fan_out: bool,
    /// Let MapBidi tear down existing bidi pairs instead of failing.
    pub bidi_remap: bool,
    /// How long an operation waits for the switch lock.
    pub lock_timeout: Duration,
}

impl Default for MappingPolicy {
    fn default() -> Self {
        Self {
            fan_out: false,
            bidi_remap: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Result of MapBidi: both endpoints after the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidiMapping {
    pub port_a: PortSnapshot,
    pub port_b: PortSnapshot,
}

/// Result of a single-destination MapUni.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniMapping {
    pub source: PortSnapshot,
    pub destination: PortSnapshot,
}

/// Result of MapUni/MapTap with a destination list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutMapping {
    pub source: PortSnapshot,
    pub destinations: Vec<PortSnapshot>,
}

/// Result of AutoLoad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoloadReport {
    pub topology: Topology,
    /// Every registered port with its current mapping state.
    pub ports: Vec<PortSnapshot>,
    pub plan: ReconcilePlan,
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub autoloads: u64,
    pub connections_created: u64,
    pub connections_removed: u64,
    pub rejected: u64,
    pub timeouts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    autoloads: AtomicU64,
    connections_created: AtomicU64,
    connections_removed: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Debug)]
struct SwitchState {
    registry: PortRegistry,
    table: ConnectionTable,
}

impl SwitchState {
    fn snapshot(&self, id: &PortId, operation: Operation) -> Result<PortSnapshot> {
        Ok(self.registry.lookup(id, operation)?.snapshot(&self.table))
    }

    /// Looks up every port in global order, failing on the first unknown one.
    fn require_all<'a>(
        &self,
        ports: impl IntoIterator<Item = &'a PortId>,
        operation: Operation,
    ) -> Result<BTreeSet<&'a PortId>> {
        let ordered: BTreeSet<&PortId> = ports.into_iter().collect();
        for id in &ordered {
            self.registry.lookup(id, operation)?;
        }
        Ok(ordered)
    }
}

/// Connection manager for one switch instance.
///
/// Safe to share between threads; every method takes `&self`.
#[derive(Debug)]
pub struct MappingEngine {
    policy: MappingPolicy,
    state: RwLock<SwitchState>,
    counters: Counters,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new(MappingPolicy::default())
    }
}

impl MappingEngine {
    /// Creates an engine with an empty registry.
    pub fn new(policy: MappingPolicy) -> Self {
        Self {
            policy,
            state: RwLock::new(SwitchState {
                registry: PortRegistry::new(),
                table: ConnectionTable::new(policy.fan_out),
            }),
            counters: Counters::default(),
        }
    }

    /// Returns the active policy.
    pub fn policy(&self) -> &MappingPolicy {
        &self.policy
    }

    /// Returns a copy of the operation counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            autoloads: self.counters.autoloads.load(Ordering::Relaxed),
            connections_created: self.counters.connections_created.load(Ordering::Relaxed),
            connections_removed: self.counters.connections_removed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    fn read(&self, operation: Operation) -> Result<RwLockReadGuard<'_, SwitchState>> {
        self.state
            .try_read_for(self.policy.lock_timeout)
            .ok_or_else(|| self.timed_out(operation))
    }

    fn write(&self, operation: Operation) -> Result<RwLockWriteGuard<'_, SwitchState>> {
        self.state
            .try_write_for(self.policy.lock_timeout)
            .ok_or_else(|| self.timed_out(operation))
    }

    fn timed_out(&self, operation: Operation) -> MappingError {
        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation = %operation,
            waited_ms = self.policy.lock_timeout.as_millis() as u64,
            "Switch lock not acquired in time"
        );
        MappingError::Timeout {
            operation,
            waited: self.policy.lock_timeout,
        }
    }

    fn rejected(&self, err: &MappingError) {
        if !matches!(err, MappingError::Timeout { .. }) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        debug!(code = ?err.code(), "Operation rejected: {}", err);
    }

    fn record(&self, applied: &AppliedEdit) {
        self.counters
            .connections_created
            .fetch_add(applied.added.len() as u64, Ordering::Relaxed);
        self.counters
            .connections_removed
            .fetch_add(applied.removed.len() as u64, Ordering::Relaxed);
        for conn in &applied.removed {
            info!("Removed connection {}", conn);
        }
        for conn in &applied.added {
            info!("Created connection {}", conn);
        }
    }

    /// Discovers the topology and reconciles the registry with it.
    ///
    /// Without an explicit `address`, the address recorded by [`login`]
    /// (if any) limits discovery. Discovery runs without holding the
    /// switch lock.
    ///
    /// [`login`]: MappingEngine::login
    #[instrument(skip(self, source))]
    pub fn autoload(
        &self,
        source: &dyn TopologySource,
        address: Option<&str>,
    ) -> Result<AutoloadReport> {
        let address = match address {
            Some(addr) => Some(addr.to_string()),
            None => self
                .read(Operation::AutoLoad)?
                .registry
                .address()
                .map(str::to_string),
        };

        debug!("Discovering topology from {}", source.describe());
        let topology = source
            .discover(address.as_deref())
            .inspect_err(|e| self.rejected(e))?;
        self.load_topology(topology)
    }

    /// Reconciles the registry with an already discovered topology.
    pub fn load_topology(&self, topology: Topology) -> Result<AutoloadReport> {
        match self.load_topology_inner(topology) {
            Ok(report) => {
                self.counters.autoloads.fetch_add(1, Ordering::Relaxed);
                info!(
                    added = report.plan.added.len(),
                    retained = report.plan.retained.len(),
                    removed = report.plan.removed.len(),
                    "AutoLoad complete, {} ports registered",
                    report.ports.len()
                );
                Ok(report)
            }
            Err(e) => {
                self.rejected(&e);
                Err(e)
            }
        }
    }

    fn load_topology_inner(&self, topology: Topology) -> Result<AutoloadReport> {
        let op = Operation::AutoLoad;
        let ports = topology.ports()?;

        let mut guard = self.write(op)?;
        let state = &mut *guard;
        let plan = state
            .registry
            .load(topology.clone(), ports, &state.table)?;
        let ports = state
            .registry
            .iter()
            .map(|p| p.snapshot(&state.table))
            .collect();
        Ok(AutoloadReport {
            topology,
            ports,
            plan,
        })
    }

    /// Returns one port with its mapping state.
    pub fn lookup(&self, id: &PortId) -> Result<PortSnapshot> {
        let op = Operation::LookupPort;
        self.read(op)?.snapshot(id, op)
    }

    /// Returns every port in (chassis, blade, port, lane) order.
    pub fn list(&self) -> Result<Vec<PortSnapshot>> {
        let state = self.read(Operation::ListPorts)?;
        Ok(state
            .registry
            .iter()
            .map(|p| p.snapshot(&state.table))
            .collect())
    }

    /// Returns every active connection in creation order.
    pub fn connections(&self) -> Result<Vec<Connection>> {
        let state = self.read(Operation::ListPorts)?;
        Ok(state.table.iter().cloned().collect())
    }

    /// Connects `a` and `b` bidirectionally.
    ///
    /// Succeeds without change if they are already bidi-mapped to each
    /// other. Fails with `PortBusy` naming the first conflicting port in
    /// global order otherwise, unless `bidi_remap` allows existing bidi
    /// pairs to be replaced.
    #[instrument(skip(self))]
    pub fn map_bidi(&self, a: &PortId, b: &PortId) -> Result<BidiMapping> {
        self.map_bidi_inner(a, b).inspect_err(|e| self.rejected(e))
    }

    fn map_bidi_inner(&self, a: &PortId, b: &PortId) -> Result<BidiMapping> {
        let op = Operation::MapBidi;
        if a == b {
            return Err(MappingError::invalid_argument(
                op,
                format!("cannot map port {} to itself", a),
            ));
        }

        let mut guard = self.write(op)?;
        let state = &mut *guard;
        let ordered = state.require_all([a, b], op)?;

        if state.table.find_bidi(a, b).is_some() {
            debug!("{} and {} already bidi-mapped", a, b);
        } else {
            let mut edit = TableEdit::new();
            for port in ordered {
                match state.table.state_of(port) {
                    MappingState::Unmapped => {}
                    MappingState::BidiWith(_) if self.policy.bidi_remap => {
                        edit.remove_all(state.table.connection_ids_of(port));
                    }
                    other => return Err(MappingError::port_busy(port, op, other)),
                }
            }
            edit.add_bidi(a.clone(), b.clone());
            let applied = state.table.apply(edit, op)?;
            self.record(&applied);
        }

        Ok(BidiMapping {
            port_a: state.snapshot(a, op)?,
            port_b: state.snapshot(b, op)?,
        })
    }

    /// Connects `source -> destination`.
    ///
    /// Without fan-out an existing destination of `source` is replaced.
    #[instrument(skip(self))]
    pub fn map_uni(&self, source: &PortId, destination: &PortId) -> Result<UniMapping> {
        let result = self
            .map_uni_inner(source, slice::from_ref(destination), Operation::MapUni)
            .inspect_err(|e| self.rejected(e))?;
        let destination = result
            .destinations
            .into_iter()
            .next()
            .ok_or_else(|| MappingError::internal("MapUni produced no destination"))?;
        Ok(UniMapping {
            source: result.source,
            destination,
        })
    }

    /// Connects `source` to every port in `destinations` in one transaction.
    ///
    /// More than one distinct destination requires fan-out.
    #[instrument(skip(self))]
    pub fn map_uni_many(&self, source: &PortId, destinations: &[PortId]) -> Result<FanOutMapping> {
        self.map_uni_inner(source, destinations, Operation::MapUni)
            .inspect_err(|e| self.rejected(e))
    }

    /// MapTap: same semantics as [`map_uni_many`](Self::map_uni_many).
    #[instrument(skip(self))]
    pub fn map_tap(&self, source: &PortId, destinations: &[PortId]) -> Result<FanOutMapping> {
        self.map_uni_inner(source, destinations, Operation::MapTap)
            .inspect_err(|e| self.rejected(e))
    }

    fn map_uni_inner(
        &self,
        source: &PortId,
        destinations: &[PortId],
        op: Operation,
    ) -> Result<FanOutMapping> {
        let targets: BTreeSet<&PortId> = destinations.iter().collect();
        if targets.is_empty() {
            return Err(MappingError::invalid_argument(
                op,
                "at least one destination is required",
            ));
        }
        if targets.contains(source) {
            return Err(MappingError::invalid_argument(
                op,
                format!("cannot map port {} to itself", source),
            ));
        }
        if targets.len() > 1 && !self.policy.fan_out {
            return Err(MappingError::invalid_argument(
                op,
                "multiple destinations require fan-out to be enabled",
            ));
        }

        let mut guard = self.write(op)?;
        let state = &mut *guard;
        let ordered = state.require_all(targets.iter().copied().chain([source]), op)?;

        let mut edit = TableEdit::new();
        for port in ordered {
            let current = state.table.state_of(port);
            if port == source {
                match current {
                    MappingState::Unmapped => {}
                    MappingState::SourceOf(existing) => {
                        if !self.policy.fan_out {
                            for old in existing.iter().filter(|d| !targets.contains(d)) {
                                if let Some(conn) = state.table.find_uni(source, old) {
                                    debug!("Replacing {} -> {}", source, old);
                                    edit.remove(conn.id);
                                }
                            }
                        }
                    }
                    other => return Err(MappingError::port_busy(port, op, other)),
                }
            } else {
                match current {
                    MappingState::Unmapped => {
                        edit.add_uni(source.clone(), port.clone());
                    }
                    MappingState::DestinationOf(ref from) if from == source => {
                        debug!("{} -> {} already mapped", source, port);
                    }
                    other => return Err(MappingError::port_busy(port, op, other)),
                }
            }
        }

        if !edit.is_empty() {
            let applied = state.table.apply(edit, op)?;
            self.record(&applied);
        }

        let source = state.snapshot(source, op)?;
        let destinations = targets
            .into_iter()
            .map(|d| state.snapshot(d, op))
            .collect::<Result<Vec<_>>>()?;
        Ok(FanOutMapping {
            source,
            destinations,
        })
    }

    /// Removes every connection `port` takes part in.
    ///
    /// Clearing an unmapped port is a no-op. Returns the removed connections.
    #[instrument(skip(self))]
    pub fn map_clear(&self, port: &PortId) -> Result<Vec<Connection>> {
        self.map_clear_many(slice::from_ref(port))
    }

    /// Clears every listed port in one transaction.
    #[instrument(skip(self))]
    pub fn map_clear_many(&self, ports: &[PortId]) -> Result<Vec<Connection>> {
        self.map_clear_inner(ports)
            .inspect_err(|e| self.rejected(e))
    }

    fn map_clear_inner(&self, ports: &[PortId]) -> Result<Vec<Connection>> {
        let op = Operation::MapClear;
        if ports.is_empty() {
            return Err(MappingError::invalid_argument(op, "no ports to clear"));
        }

        let mut guard = self.write(op)?;
        let state = &mut *guard;
        let ordered = state.require_all(ports, op)?;

        let mut edit = TableEdit::new();
        for port in ordered {
            edit.remove_all(state.table.connection_ids_of(port));
        }
        if edit.is_empty() {
            debug!("Nothing to clear");
            return Ok(Vec::new());
        }

        let applied = state.table.apply(edit, op)?;
        self.record(&applied);
        Ok(applied.removed)
    }

    /// Removes the uni connection `source -> destination`.
    #[instrument(skip(self))]
    pub fn map_clear_to(&self, source: &PortId, destination: &PortId) -> Result<Connection> {
        self.map_clear_to_many(source, slice::from_ref(destination))?
            .into_iter()
            .next()
            .ok_or_else(|| MappingError::internal("MapClearTo removed nothing"))
    }

    /// Removes `source -> d` for every `d` in one transaction.
    ///
    /// Fails with `MappingNotFound` for the first missing pair in global
    /// order, removing nothing.
    #[instrument(skip(self))]
    pub fn map_clear_to_many(
        &self,
        source: &PortId,
        destinations: &[PortId],
    ) -> Result<Vec<Connection>> {
        self.map_clear_to_inner(source, destinations)
            .inspect_err(|e| self.rejected(e))
    }

    fn map_clear_to_inner(
        &self,
        source: &PortId,
        destinations: &[PortId],
    ) -> Result<Vec<Connection>> {
        let op = Operation::MapClearTo;
        if destinations.is_empty() {
            return Err(MappingError::invalid_argument(
                op,
                "at least one destination is required",
            ));
        }

        let mut guard = self.write(op)?;
        let state = &mut *guard;
        state.require_all(destinations.iter().chain([source]), op)?;

        let targets: BTreeSet<&PortId> = destinations.iter().collect();
        let mut edit = TableEdit::new();
        for dst in targets {
            let conn = state
                .table
                .find_uni(source, dst)
                .ok_or_else(|| MappingError::mapping_not_found(source, dst, op))?;
            edit.remove(conn.id);
        }

        let applied = state.table.apply(edit, op)?;
        self.record(&applied);
        Ok(applied.removed)
    }

    /// Records the chassis address used by later AutoLoad calls.
    ///
    /// The address is reduced with [`chassis_address`] first; the reduced
    /// form is returned.
    #[instrument(skip(self))]
    pub fn login(&self, address: &str) -> Result<String> {
        let op = Operation::Login;
        let address = chassis_address(address);
        if address.is_empty() {
            let err = MappingError::invalid_argument(op, "address must not be empty");
            self.rejected(&err);
            return Err(err);
        }
        self.write(op)?.registry.set_address(address);
        Ok(address.to_string())
    }

    /// Returns the orchestrator's synchronization id.
    pub fn state_id(&self) -> Result<String> {
        Ok(self.read(Operation::GetStateId)?.registry.state_id().to_string())
    }

    /// Sets the orchestrator's synchronization id.
    pub fn set_state_id(&self, state_id: &str) -> Result<()> {
        self.write(Operation::SetStateId)?
            .registry
            .set_state_id(state_id);
        info!("State id set to {}", state_id);
        Ok(())
    }

    /// Reads a port attribute.
    pub fn attribute(&self, port: &PortId, name: &str) -> Result<String> {
        self.read(Operation::GetAttributeValue)?
            .registry
            .attribute(port, name)
            .inspect_err(|e| self.rejected(e))
    }

    /// Writes a port attribute.
    #[instrument(skip(self))]
    pub fn set_attribute(&self, port: &PortId, name: &str, value: &str) -> Result<()> {
        self.write(Operation::SetAttributeValue)?
            .registry
            .set_attribute(port, name, value)
            .inspect_err(|e| self.rejected(e))
    }
}
