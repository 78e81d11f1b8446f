#![forbid(unsafe_code)]

//! Connectivity grouping of the pattern graph.
//!
//! Every connection starts in its own group; groups sharing a variable are
//! merged until no two groups intersect. Named vertices that appear in no
//! connection become node-only groups. The resulting groups are the
//! connected components of the pattern and are planned independently before
//! being joined or multiplied together.

use std::fmt;

use tracing::debug;

use crate::query::{
    algebra::AlgebraPlan,
    ast::{Connection, GraphQuery},
    errors::PlanError,
    registry::{VariableKind, VariableRegistry},
};

/// Identifier of a connection group, stable across merges.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// One connected component of the pattern graph and its plan.
#[derive(Clone, Debug)]
pub struct ConnectionGroup {
    /// Identifier.
    pub id: GroupId,
    connections: Vec<Connection>,
    variables: Vec<String>,
    plan: Option<AlgebraPlan>,
}

impl ConnectionGroup {
    /// Group holding one connection's three variables.
    pub fn from_connection(id: GroupId, connection: Connection) -> Self {
        let mut group = Self {
            id,
            connections: Vec::new(),
            variables: Vec::new(),
            plan: None,
        };
        group.add_variable(&connection.src.name);
        group.add_variable(&connection.dst.name);
        group.add_variable(&connection.edge.name);
        group.connections.push(connection);
        group
    }

    /// Group holding a single isolated vertex.
    pub fn node_only(id: GroupId, var: &str) -> Self {
        Self {
            id,
            connections: Vec::new(),
            variables: vec![var.to_owned()],
            plan: None,
        }
    }

    fn add_variable(&mut self, var: &str) {
        if !self.contains_variable(var) {
            self.variables.push(var.to_owned());
        }
    }

    /// Connections in pattern order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Variables in first-seen order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Returns true if `var` belongs to the group.
    pub fn contains_variable(&self, var: &str) -> bool {
        self.variables.iter().any(|v| v == var)
    }

    /// Returns true if the two groups share a variable.
    pub fn can_be_connected(&self, other: &ConnectionGroup) -> bool {
        other.variables.iter().any(|var| self.contains_variable(var))
    }

    /// Absorbs another group's connections and variables; its plan is dropped.
    pub fn merge(&mut self, other: ConnectionGroup) {
        for var in &other.variables {
            self.add_variable(var);
        }
        self.connections.extend(other.connections);
    }

    /// First node variable in first-seen order.
    pub fn first_node_variable(&self, registry: &VariableRegistry) -> Option<&str> {
        self.variables
            .iter()
            .find(|var| registry.lookup(var).is_some_and(|v| v.is_node()))
            .map(String::as_str)
    }

    /// Current plan, if the group has been translated.
    pub fn plan(&self) -> Option<&AlgebraPlan> {
        self.plan.as_ref()
    }

    /// Installs the group's plan.
    pub fn set_plan(&mut self, plan: AlgebraPlan) {
        self.plan = Some(plan);
    }

    /// Removes and returns the group's plan.
    pub fn take_plan(&mut self) -> Result<AlgebraPlan, PlanError> {
        self.plan
            .take()
            .ok_or_else(|| PlanError::invalid_state(format!("group {} has no plan", self.id)))
    }
}

/// Merges one group per connection into connected components.
///
/// Group ids are assigned from `0` in connection order.
pub fn group_connections(connections: &[Connection]) -> Vec<ConnectionGroup> {
    let mut groups: Vec<ConnectionGroup> = connections
        .iter()
        .enumerate()
        .map(|(idx, conn)| ConnectionGroup::from_connection(GroupId(idx as u32), conn.clone()))
        .collect();
    while groups.len() > 1 {
        let Some((keep, absorb)) = find_connected_pair(&groups) else {
            break;
        };
        let absorbed = groups.remove(absorb);
        groups[keep].merge(absorbed);
    }
    groups
}

fn find_connected_pair(groups: &[ConnectionGroup]) -> Option<(usize, usize)> {
    for (i, left) in groups.iter().enumerate() {
        for (j, right) in groups.iter().enumerate().skip(i + 1) {
            if left.can_be_connected(right) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Registers every pattern variable and splits the pattern into groups.
pub fn partition(
    query: &GraphQuery,
    registry: &mut VariableRegistry,
) -> Result<Vec<ConnectionGroup>, PlanError> {
    for conn in &query.connections {
        registry.register(&conn.src.name, conn.src.anonymous, VariableKind::Node)?;
        registry.register(&conn.dst.name, conn.dst.anonymous, VariableKind::Node)?;
        registry.register(&conn.edge.name, conn.edge.anonymous, VariableKind::Edge)?;
    }
    let mut groups = group_connections(&query.connections);
    let mut next_id = query.connections.len() as u32;
    for vertex in &query.vertices {
        if vertex.anonymous || registry.contains(&vertex.name) {
            continue;
        }
        registry.register(&vertex.name, false, VariableKind::Node)?;
        groups.push(ConnectionGroup::node_only(GroupId(next_id), &vertex.name));
        next_id += 1;
    }
    if groups.is_empty() {
        return Err(PlanError::unsatisfiable(
            "the pattern binds no named vertex or connection",
        ));
    }
    debug!(
        groups = groups.len(),
        variables = registry.len(),
        "partitioned pattern graph"
    );
    Ok(groups)
}
