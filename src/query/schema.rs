#![forbid(unsafe_code)]

//! Positional column schema of an algebra plan.
//!
//! Every column has a role tag and is indexed by a composite [`ColumnKey`] so
//! the planner can ask "is `n.name` already materialized, and where?" in O(1).
//! Positions are always equal to the column's index; reductions return an
//! explicit [`ColumnRemap`] instead of silently invalidating indices.

use std::mem;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::query::{ast::AggregateKind, errors::PlanError};

/// Semantic role of a column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ColumnRole {
    /// Object identifiers bound to a pattern variable.
    Variable,
    /// Attribute values of a variable.
    Attribute,
    /// Label (type) identifiers of a variable.
    Label,
    /// Check-only values destined for removal.
    Scratch,
    /// Computed expression values.
    Expression,
    /// Aggregate results produced by GROUP.
    Aggregate,
}

/// Column metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDescriptor {
    /// Main name: the variable for most roles, the subexpression for aggregates.
    pub primary: String,
    /// Attribute name or aggregate function name.
    pub secondary: Option<String>,
    /// Position in the schema.
    pub position: usize,
    /// Role tag.
    pub role: ColumnRole,
}

impl ColumnDescriptor {
    /// Index key identifying this column.
    pub fn key(&self) -> ColumnKey {
        let secondary = self.secondary.clone().unwrap_or_default();
        match self.role {
            ColumnRole::Variable => ColumnKey::Variable(self.primary.clone()),
            ColumnRole::Attribute => ColumnKey::Attribute(self.primary.clone(), secondary),
            ColumnRole::Label => ColumnKey::Label(self.primary.clone()),
            ColumnRole::Scratch => ColumnKey::Scratch(self.primary.clone()),
            ColumnRole::Expression => ColumnKey::Expression(self.primary.clone()),
            ColumnRole::Aggregate => {
                ColumnKey::Aggregate(format!("{secondary}({})", self.primary))
            }
        }
    }
}

/// Composite lookup key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ColumnKey {
    /// Variable name.
    Variable(String),
    /// Variable and attribute names.
    Attribute(String, String),
    /// Variable whose label the column holds.
    Label(String),
    /// Scratch tag.
    Scratch(String),
    /// Generated expression column name.
    Expression(String),
    /// `KIND(subexpr)`.
    Aggregate(String),
}

/// Old-to-new position mapping returned by [`Schema::reduce_columns`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnRemap {
    mapping: Vec<Option<usize>>,
}

impl ColumnRemap {
    /// New position of an old column, or `None` if it was dropped.
    pub fn get(&self, old: usize) -> Option<usize> {
        self.mapping.get(old).copied().flatten()
    }

    /// Number of columns before the reduction.
    pub fn old_len(&self) -> usize {
        self.mapping.len()
    }
}

/// Ordered, positionally addressed columns plus key and alias indices.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    keys: FxHashMap<ColumnKey, usize>,
    aliases: FxHashMap<String, usize>,
    next_expression: u64,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column descriptors in position order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn push(&mut self, primary: String, secondary: Option<String>, role: ColumnRole) -> usize {
        let position = self.columns.len();
        let column = ColumnDescriptor {
            primary,
            secondary,
            position,
            role,
        };
        trace!(position, ?role, key = ?column.key(), "adding column");
        self.keys.insert(column.key(), position);
        self.columns.push(column);
        position
    }

    /// Appends a variable column.
    pub fn add_variable_column(&mut self, var: &str) -> usize {
        self.push(var.to_owned(), None, ColumnRole::Variable)
    }

    /// Appends an attribute column for `var.attr`.
    pub fn add_attribute_column(&mut self, var: &str, attr: &str) -> usize {
        self.push(var.to_owned(), Some(attr.to_owned()), ColumnRole::Attribute)
    }

    /// Appends a label column for `var`.
    pub fn add_label_column(&mut self, var: &str) -> usize {
        self.push(var.to_owned(), None, ColumnRole::Label)
    }

    /// Appends a scratch column.
    pub fn add_scratch_column(&mut self, tag: &str) -> usize {
        self.push(tag.to_owned(), None, ColumnRole::Scratch)
    }

    /// Appends a computed column with a schema-unique generated name.
    pub fn add_expression_column(&mut self) -> usize {
        let name = format!("expr#{}", self.next_expression);
        self.next_expression += 1;
        self.push(name, None, ColumnRole::Expression)
    }

    /// Appends an aggregate result column, aliased by `KIND(subexpr)`.
    pub fn add_aggregate_column(&mut self, kind: AggregateKind, subexpr: &str) -> usize {
        let position = self.push(
            subexpr.to_owned(),
            Some(kind.to_string()),
            ColumnRole::Aggregate,
        );
        self.aliases.insert(format!("{kind}({subexpr})"), position);
        position
    }

    /// Returns true if `var` has a variable column.
    pub fn contains_variable(&self, var: &str) -> bool {
        self.variable_index(var).is_some()
    }

    /// Returns true if `var.attr` has an attribute column.
    pub fn contains_attribute(&self, var: &str, attr: &str) -> bool {
        self.attribute_index(var, attr).is_some()
    }

    /// Returns true if `var` has a label column.
    pub fn contains_label(&self, var: &str) -> bool {
        self.label_index(var).is_some()
    }

    /// Position of the variable column for `var`.
    pub fn variable_index(&self, var: &str) -> Option<usize> {
        self.keys.get(&ColumnKey::Variable(var.to_owned())).copied()
    }

    /// Position of the attribute column for `var.attr`.
    pub fn attribute_index(&self, var: &str, attr: &str) -> Option<usize> {
        self.keys
            .get(&ColumnKey::Attribute(var.to_owned(), attr.to_owned()))
            .copied()
    }

    /// Position of the label column for `var`.
    pub fn label_index(&self, var: &str) -> Option<usize> {
        self.keys.get(&ColumnKey::Label(var.to_owned())).copied()
    }

    /// Position of the aggregate column keyed `KIND(subexpr)`.
    pub fn aggregate_index(&self, key: &str) -> Option<usize> {
        self.keys.get(&ColumnKey::Aggregate(key.to_owned())).copied()
    }

    /// Makes `alias` resolve to column `col`.
    pub fn set_alias(&mut self, alias: &str, col: usize) -> Result<(), PlanError> {
        if col >= self.columns.len() {
            return Err(PlanError::invalid_state(format!(
                "alias '{alias}' targets column {col} but the schema has {} columns",
                self.columns.len()
            )));
        }
        trace!(alias, col, "setting alias");
        self.aliases.insert(alias.to_owned(), col);
        Ok(())
    }

    /// Position an alias resolves to.
    pub fn alias_position(&self, alias: &str) -> Option<usize> {
        self.aliases.get(alias).copied()
    }

    /// Names of all variable columns in position order.
    pub fn variables(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|column| column.role == ColumnRole::Variable)
            .map(|column| column.primary.clone())
            .collect()
    }

    /// Keeps only the listed positions, renumbered to their index in `keep`.
    ///
    /// Index and alias entries of dropped columns are removed. A position
    /// listed more than once is kept once with its keys and repeated as a
    /// scratch copy.
    pub fn reduce_columns(&mut self, keep: &[usize]) -> Result<ColumnRemap, PlanError> {
        if let Some(bad) = keep.iter().find(|&&pos| pos >= self.columns.len()) {
            return Err(PlanError::invalid_state(format!(
                "cannot keep column {bad} of a {}-column schema",
                self.columns.len()
            )));
        }
        let old = mem::take(&mut self.columns);
        let mut mapping = vec![None; old.len()];
        for (position, &old_pos) in keep.iter().enumerate() {
            let source = &old[old_pos];
            let column = if mapping[old_pos].is_none() {
                mapping[old_pos] = Some(position);
                ColumnDescriptor {
                    position,
                    ..source.clone()
                }
            } else {
                ColumnDescriptor {
                    primary: source.primary.clone(),
                    secondary: None,
                    position,
                    role: ColumnRole::Scratch,
                }
            };
            self.columns.push(column);
        }

        // Rebuild so no key can point at a dropped or moved column.
        self.keys.clear();
        for column in &self.columns {
            self.keys.insert(column.key(), column.position);
        }
        self.aliases.retain(|_, pos| match mapping[*pos] {
            Some(new_pos) => {
                *pos = new_pos;
                true
            }
            None => false,
        });
        trace!(kept = ?keep, remaining = self.columns.len(), "reduced columns");
        Ok(ColumnRemap { mapping })
    }

    /// Appends copies of another schema's structural columns.
    ///
    /// Used after JOIN/PRODUCT; the copies land at new trailing positions.
    /// Expression and aggregate columns cannot be re-derived after a merge.
    pub fn add_columns_data(&mut self, other: &Schema) -> Result<(), PlanError> {
        if let Some(column) = other
            .columns
            .iter()
            .find(|c| matches!(c.role, ColumnRole::Expression | ColumnRole::Aggregate))
        {
            return Err(PlanError::invalid_state(format!(
                "cannot merge {:?} column '{}' into another plan",
                column.role, column.primary
            )));
        }
        for column in &other.columns {
            self.push(
                column.primary.clone(),
                column.secondary.clone(),
                column.role,
            );
        }
        Ok(())
    }
}
