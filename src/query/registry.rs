#![forbid(unsafe_code)]

//! Per-translation registry of pattern variables.

use std::collections::BTreeMap;

use tracing::trace;

use crate::query::errors::PlanError;

/// Whether a pattern variable binds vertices or edges.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VariableKind {
    /// Vertex variable.
    Node,
    /// Edge variable.
    Edge,
}

/// Identity of one pattern variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Node or edge.
    pub kind: VariableKind,
    /// Whether the source query left it unnamed.
    pub anonymous: bool,
}

impl Variable {
    /// Returns true for vertex variables.
    pub fn is_node(&self) -> bool {
        self.kind == VariableKind::Node
    }

    /// Returns true for edge variables.
    pub fn is_edge(&self) -> bool {
        self.kind == VariableKind::Edge
    }
}

/// Tracks every variable seen in the pattern.
#[derive(Clone, Debug, Default)]
pub struct VariableRegistry {
    vars: BTreeMap<String, Variable>,
}

impl VariableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variable; re-registering the same name is a no-op.
    ///
    /// A name first seen as a node and later as an edge (or vice versa) is
    /// rejected since the algebra cannot bind one column to both.
    pub fn register(
        &mut self,
        name: &str,
        anonymous: bool,
        kind: VariableKind,
    ) -> Result<&Variable, PlanError> {
        if let Some(existing) = self.vars.get(name) {
            if existing.kind != kind {
                return Err(PlanError::invalid_state(format!(
                    "variable '{name}' used both as {:?} and {:?}",
                    existing.kind, kind
                )));
            }
        } else {
            trace!(name, ?kind, anonymous, "registering pattern variable");
        }
        Ok(self
            .vars
            .entry(name.to_owned())
            .or_insert_with(|| Variable {
                name: name.to_owned(),
                kind,
                anonymous,
            }))
    }

    /// Looks a variable up by name.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Returns true if `name` is a registered pattern variable.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterates registered variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true when nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
