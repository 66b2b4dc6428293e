//! The connection table: every active uni and bidi connection on a switch.
//!
//! The table never changes piecemeal. Callers describe the whole change as a
//! [`TableEdit`] (connections to drop plus connections to create) and
//! [`ConnectionTable::apply`] checks the result against the one-role-per-port
//! rule before touching anything. A rejected edit leaves the table as it was.
//!
//! Lookups never create entries: a port with no connections has no index
//! entry at all, and `state_of` reports it as [`MappingState::Unmapped`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};
use crate::operation::Operation;
use crate::state::MappingState;
use l1_types::{Direction, PortId};

/// Identifier assigned to a connection when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// One active connection.
///
/// For `Bidi` the endpoints are stored in global port order, so `source`
/// is always the lower of the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub direction: Direction,
    pub source: PortId,
    pub destination: PortId,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Returns both endpoints.
    pub fn endpoints(&self) -> [&PortId; 2] {
        [&self.source, &self.destination]
    }

    /// Returns the other endpoint, if `port` is one of them.
    pub fn peer_of(&self, port: &PortId) -> Option<&PortId> {
        if &self.source == port {
            Some(&self.destination)
        } else if &self.destination == port {
            Some(&self.source)
        } else {
            None
        }
    }

    fn role_of(&self, port: &PortId) -> Role {
        match self.direction {
            Direction::Bidi => Role::Bidi,
            Direction::Uni if &self.source == port => Role::Source,
            Direction::Uni => Role::Destination,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::Uni => "->",
            Direction::Bidi => "<->",
        };
        write!(f, "{} {} {} {}", self.id, self.source, arrow, self.destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Source,
    Destination,
    Bidi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingConnection {
    direction: Direction,
    source: PortId,
    destination: PortId,
}

impl PendingConnection {
    fn role_of(&self, port: &PortId) -> Role {
        match self.direction {
            Direction::Bidi => Role::Bidi,
            Direction::Uni if &self.source == port => Role::Source,
            Direction::Uni => Role::Destination,
        }
    }
}

/// A complete description of one change to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableEdit {
    remove: BTreeSet<ConnectionId>,
    add: Vec<PendingConnection>,
}

impl TableEdit {
    /// Creates an empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops an existing connection.
    pub fn remove(&mut self, id: ConnectionId) -> &mut Self {
        self.remove.insert(id);
        self
    }

    /// Drops every listed connection.
    pub fn remove_all(&mut self, ids: impl IntoIterator<Item = ConnectionId>) -> &mut Self {
        self.remove.extend(ids);
        self
    }

    /// Creates a uni connection `source -> destination`.
    pub fn add_uni(&mut self, source: PortId, destination: PortId) -> &mut Self {
        self.add.push(PendingConnection {
            direction: Direction::Uni,
            source,
            destination,
        });
        self
    }

    /// Creates a bidi connection between `a` and `b`.
    pub fn add_bidi(&mut self, a: PortId, b: PortId) -> &mut Self {
        let (source, destination) = if a <= b { (a, b) } else { (b, a) };
        self.add.push(PendingConnection {
            direction: Direction::Bidi,
            source,
            destination,
        });
        self
    }

    /// Returns true if applying the edit would change nothing.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// What an applied edit actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedEdit {
    pub removed: Vec<Connection>,
    pub added: Vec<Connection>,
}

/// All active connections of one switch, indexed by id and by port.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    connections: BTreeMap<ConnectionId, Connection>,
    by_port: HashMap<PortId, BTreeSet<ConnectionId>>,
    next_id: u64,
    allow_fan_out: bool,
}

impl ConnectionTable {
    /// Creates an empty table.
    ///
    /// With `allow_fan_out`, a port may be the source of several uni
    /// connections at once.
    pub fn new(allow_fan_out: bool) -> Self {
        Self {
            allow_fan_out,
            ..Self::default()
        }
    }

    /// Returns the number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns a connection by id.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Iterates connections in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Returns the ids of every connection touching `port`.
    pub fn connection_ids_of(&self, port: &PortId) -> Vec<ConnectionId> {
        self.by_port
            .get(port)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns true if `port` is an endpoint of any connection.
    pub fn is_mapped(&self, port: &PortId) -> bool {
        self.by_port.contains_key(port)
    }

    /// Returns every port that is currently mapped, in global order.
    pub fn mapped_ports(&self) -> BTreeSet<PortId> {
        self.by_port.keys().cloned().collect()
    }

    /// Derives the mapping state of `port`.
    pub fn state_of(&self, port: &PortId) -> MappingState {
        let Some(ids) = self.by_port.get(port) else {
            return MappingState::Unmapped;
        };

        let mut destinations = Vec::new();
        for conn in ids.iter().filter_map(|id| self.connections.get(id)) {
            match conn.role_of(port) {
                Role::Bidi => {
                    if let Some(peer) = conn.peer_of(port) {
                        return MappingState::BidiWith(peer.clone());
                    }
                }
                Role::Destination => return MappingState::DestinationOf(conn.source.clone()),
                Role::Source => destinations.push(conn.destination.clone()),
            }
        }

        if destinations.is_empty() {
            MappingState::Unmapped
        } else {
            destinations.sort();
            MappingState::SourceOf(destinations)
        }
    }

    /// Finds the uni connection `source -> destination`.
    pub fn find_uni(&self, source: &PortId, destination: &PortId) -> Option<&Connection> {
        self.find(source, |c| {
            c.direction == Direction::Uni && &c.source == source && &c.destination == destination
        })
    }

    /// Finds the bidi connection between `a` and `b`, in either order.
    pub fn find_bidi(&self, a: &PortId, b: &PortId) -> Option<&Connection> {
        self.find(a, |c| c.direction == Direction::Bidi && c.peer_of(a) == Some(b))
    }

    fn find(&self, port: &PortId, pred: impl Fn(&Connection) -> bool) -> Option<&Connection> {
        self.by_port
            .get(port)?
            .iter()
            .filter_map(|id| self.connections.get(id))
            .find(|c| pred(c))
    }

    /// Applies an edit atomically.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if an added connection loops a port to itself
    /// - `PortBusy` if any port would end up with more than one role, or
    ///   with several uni sources while fan-out is disabled
    /// - `Internal` if a removal names a connection that does not exist
    ///
    /// On error the table is unchanged.
    pub fn apply(&mut self, edit: TableEdit, operation: Operation) -> Result<AppliedEdit> {
        for id in &edit.remove {
            if !self.connections.contains_key(id) {
                return Err(MappingError::internal(format!(
                    "{}: connection {} does not exist",
                    operation, id
                )));
            }
        }
        for pending in &edit.add {
            if pending.source == pending.destination {
                return Err(MappingError::invalid_argument(
                    operation,
                    format!("cannot map port {} to itself", pending.source),
                ));
            }
        }

        let touched: BTreeSet<&PortId> = edit
            .add
            .iter()
            .flat_map(|p| [&p.source, &p.destination])
            .collect();

        for port in touched {
            let mut roles: Vec<Role> = self
                .by_port
                .get(port)
                .into_iter()
                .flatten()
                .filter(|id| !edit.remove.contains(*id))
                .filter_map(|id| self.connections.get(id))
                .map(|c| c.role_of(port))
                .collect();
            roles.extend(
                edit.add
                    .iter()
                    .filter(|p| &p.source == port || &p.destination == port)
                    .map(|p| p.role_of(port)),
            );

            let fan_out_ok = self.allow_fan_out && roles.iter().all(|r| *r == Role::Source);
            if roles.len() > 1 && !fan_out_ok {
                return Err(MappingError::port_busy(port, operation, self.state_of(port)));
            }
        }

        let mut applied = AppliedEdit::default();
        for id in edit.remove {
            if let Some(conn) = self.detach(id) {
                applied.removed.push(conn);
            }
        }
        let now = Utc::now();
        for pending in edit.add {
            self.next_id += 1;
            let conn = Connection {
                id: ConnectionId(self.next_id),
                direction: pending.direction,
                source: pending.source,
                destination: pending.destination,
                created_at: now,
            };
            for port in conn.endpoints() {
                self.by_port.entry(port.clone()).or_default().insert(conn.id);
            }
            self.connections.insert(conn.id, conn.clone());
            applied.added.push(conn);
        }

        Ok(applied)
    }

    fn detach(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        for port in conn.endpoints() {
            if let Some(ids) = self.by_port.get_mut(port) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_port.remove(port);
                }
            }
        }
        Some(conn)
    }
}
