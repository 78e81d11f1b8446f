#![forbid(unsafe_code)]

//! Static analysis over expression trees.
//!
//! Analysis records which pattern variables an expression needs, which of
//! their attributes and labels must be materialized, and whether it uses
//! aggregates. [`AnalysisMode::PostGroup`] treats aggregates as opaque leaves:
//! after GROUP their inputs no longer exist and only their result columns do.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::query::{
    algebra::{AlgebraOp, AlgebraPlan},
    ast::{BinaryOp, Builtin, Expr},
    registry::VariableRegistry,
};

/// Which side of the GROUP operator an expression is evaluated on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalysisMode {
    /// Before grouping: aggregates are descended into.
    PreGroup,
    /// After grouping: aggregates are opaque.
    PostGroup,
}

/// What one expression needs from one variable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VariableUsage {
    /// Whether the variable's label is inspected.
    pub label_checked: bool,
    /// Accessed property names.
    pub attributes: BTreeSet<String>,
}

/// Analysis result for one expression.
#[derive(Clone, Debug)]
pub struct ExpressionInfo {
    expr: Expr,
    mode: AnalysisMode,
    variables: BTreeMap<String, VariableUsage>,
    labels: BTreeSet<String>,
    direct_refs: BTreeSet<String>,
    has_aggregates: bool,
    pending: usize,
}

impl ExpressionInfo {
    /// Analyzes `expr` in the given mode.
    pub fn analyze(expr: Expr, mode: AnalysisMode) -> Self {
        let mut info = Self {
            expr,
            mode,
            variables: BTreeMap::new(),
            labels: BTreeSet::new(),
            direct_refs: BTreeSet::new(),
            has_aggregates: false,
            pending: 0,
        };
        let expr = info.expr.clone();
        info.visit(&expr);
        trace!(
            expr = %info.expr,
            ?mode,
            variables = ?info.variables.keys().collect::<Vec<_>>(),
            labels = ?info.labels,
            refs = ?info.direct_refs,
            "analyzed expression"
        );
        info
    }

    fn usage_mut(&mut self, var: &str) -> &mut VariableUsage {
        if !self.variables.contains_key(var) {
            self.pending += 1;
        }
        self.variables.entry(var.to_owned()).or_default()
    }

    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::VarRef { name } => {
                self.direct_refs.insert(name.clone());
            }
            Expr::PropAccess { var, prop } => {
                self.usage_mut(var).attributes.insert(prop.clone());
            }
            Expr::Int { .. }
            | Expr::Decimal { .. }
            | Expr::Str { .. }
            | Expr::Bool { .. }
            | Expr::Null => {}
            Expr::Binary { op, lhs, rhs } => {
                self.visit(lhs);
                self.visit(rhs);
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                    if let (Expr::EdgeLabel { .. }, Expr::Str { value }) = (&**lhs, &**rhs) {
                        self.labels.insert(value.clone());
                    }
                }
            }
            Expr::Unary { expr, .. } => self.visit(expr),
            Expr::Aggregate { arg, .. } => match self.mode {
                AnalysisMode::PreGroup => {
                    self.has_aggregates = true;
                    if let Some(arg) = arg {
                        self.visit(arg);
                    }
                }
                AnalysisMode::PostGroup => {}
            },
            Expr::HasLabel { var, label } => {
                self.usage_mut(var).label_checked = true;
                self.labels.insert(label.clone());
            }
            Expr::EdgeLabel { var } => {
                self.usage_mut(var).label_checked = true;
            }
            Expr::Call { func, args } => {
                if *func != Builtin::VertexLabels {
                    for arg in args {
                        self.visit(arg);
                    }
                }
            }
        }
    }

    /// Treats bare references to pattern variables as variable uses.
    ///
    /// Such references need the variable's column, so they count as pending
    /// and link the expression to the variable's group. References to
    /// anything else stay aliases.
    pub fn promote_pattern_refs(&mut self, registry: &VariableRegistry) {
        let refs: Vec<String> = self
            .direct_refs
            .iter()
            .filter(|name| registry.contains(name))
            .cloned()
            .collect();
        for name in refs {
            self.usage_mut(&name);
        }
    }

    /// Analyzed expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Referenced variables and their usage.
    pub fn variables(&self) -> &BTreeMap<String, VariableUsage> {
        &self.variables
    }

    /// Usage of one variable.
    pub fn usage(&self, var: &str) -> Option<&VariableUsage> {
        self.variables.get(var)
    }

    /// First referenced variable in name order.
    pub fn first_variable(&self) -> Option<(&str, &VariableUsage)> {
        self.variables
            .iter()
            .next()
            .map(|(name, usage)| (name.as_str(), usage))
    }

    /// Label names the expression tests against.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Bare variable or alias references.
    pub fn direct_refs(&self) -> &BTreeSet<String> {
        &self.direct_refs
    }

    /// Whether an aggregate was seen.
    pub fn has_aggregates(&self) -> bool {
        self.has_aggregates
    }

    /// Referenced variables not yet available in any plan.
    pub fn pending_variable_count(&self) -> usize {
        self.pending
    }

    /// Records that `vars` became available.
    pub fn mark_available(&mut self, vars: &[String]) {
        for var in vars {
            if self.variables.contains_key(var) {
                self.pending = self.pending.saturating_sub(1);
            }
        }
    }

    /// Materializes the attributes and labels this expression needs for every
    /// referenced variable that `plan` already binds.
    ///
    /// Missing attributes of one variable are fetched in a single
    /// `GRAPH::GET`; a checked label is fetched with `GRAPH::GET_TYPE`.
    /// Columns already in the schema are never fetched twice.
    pub fn add_missing_columns(&self, plan: &mut AlgebraPlan, scope: &str) {
        for (var, usage) in &self.variables {
            let Some(col) = plan.schema.variable_index(var) else {
                continue;
            };
            let missing: Vec<String> = usage
                .attributes
                .iter()
                .filter(|attr| !plan.schema.contains_attribute(var, attr))
                .cloned()
                .collect();
            if !missing.is_empty() {
                for attr in &missing {
                    plan.schema.add_attribute_column(var, attr);
                }
                plan.wrap(AlgebraOp::GetAttributes {
                    col,
                    scope: scope.to_owned(),
                    attrs: missing,
                });
            }
            if usage.label_checked && !plan.schema.contains_label(var) {
                plan.wrap(AlgebraOp::GetType { col });
                plan.schema.add_label_column(var);
            }
        }
    }
}
